//! Parser for the output of the `stats` console command:
//!
//! ```text
//!   CPU   NetIn   NetOut    Uptime  Maps   FPS   Players  Svms    +-ms   ~tick
//!   10.0 241763.2 1518923.5   10419    58  127.98      16    3.72    1.56    0.36
//! ```

use crate::{
    errors::{Error, Result},
    models::StatsResponse,
};

use nom::{
    bytes::complete::take_till1,
    character::complete::multispace0,
    multi::count,
    number::complete::double,
    sequence::preceded,
    IResult,
};

const COLUMNS: usize = 10;

fn column_name(i: &str) -> IResult<&str, &str> {
    preceded(multispace0, take_till1(char::is_whitespace))(i)
}

fn value(i: &str) -> IResult<&str, f64> {
    preceded(multispace0, double)(i)
}

fn table(i: &str) -> IResult<&str, Vec<f64>> {
    preceded(count(column_name, COLUMNS), count(value, COLUMNS))(i)
}

fn integer(name: &str, v: f64) -> Result<i64> {
    if v.fract() != 0.0 {
        return Err(Error::BadStats(format!("{} is not an integer: {}", name, v)));
    }
    Ok(v as i64)
}

impl StatsResponse {
    pub fn parse(output: &str) -> Result<Self> {
        let (_, v) = table(output).map_err(|_| {
            Error::BadStats(format!(
                "expected {} column names followed by {} values",
                COLUMNS, COLUMNS
            ))
        })?;

        Ok(Self {
            cpu: v[0].trunc() as i64,
            net_in: v[1],
            net_out: v[2],
            uptime: integer("uptime", v[3])?,
            maps: integer("maps", v[4])?,
            fps: v[5],
            players: integer("players", v[6])?,
            svms: v[7],
            plus_minus_ms: v[8],
            tick: v[9],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "  CPU   NetIn   NetOut    Uptime  Maps   FPS   Players  Svms    +-ms   ~tick
  10.0 241763.2 1518923.5   10419    58  127.98      16    3.72    1.56    0.36
L 03/09/2018 - 08:59:17: rcon from \"10.0.0.1:60415\": command \"stats\"
";

    #[test]
    fn test_parse_stats() {
        let expectation = StatsResponse {
            cpu: 10,
            net_in: 241763.2,
            net_out: 1518923.5,
            uptime: 10419,
            maps: 58,
            fps: 127.98,
            players: 16,
            svms: 3.72,
            plus_minus_ms: 1.56,
            tick: 0.36,
        };

        assert_eq!(StatsResponse::parse(OUTPUT).unwrap(), expectation);
    }

    #[test]
    fn test_parse_stats_too_few_values() {
        let output = "CPU NetIn NetOut Uptime Maps FPS Players Svms +-ms ~tick\n10.0 1.0 2.0";

        assert!(matches!(
            StatsResponse::parse(output),
            Err(Error::BadStats(_))
        ));
    }

    #[test]
    fn test_parse_stats_fractional_players() {
        let output = "CPU NetIn NetOut Uptime Maps FPS Players Svms +-ms ~tick\n\
                      1 2 3 4 5 6 7.5 8 9 10";

        assert!(matches!(
            StatsResponse::parse(output),
            Err(Error::BadStats(_))
        ));
    }
}
