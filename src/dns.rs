use crate::{
    errors::{Error, Result},
    models::Host,
};

use std::net::{IpAddr, SocketAddr};
use tokio::sync::OnceCell;
use tracing::debug;
use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};

/// Query servers are reached over IPv4 more often than not.
fn pick_address<I>(addrs: I) -> Option<IpAddr>
where
    I: IntoIterator<Item = IpAddr>,
{
    let mut first = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        first.get_or_insert(addr);
    }
    first
}

/// Lazily built DNS resolver. Literal IP addresses never hit the network.
#[derive(Default)]
pub struct Resolver {
    inner: OnceCell<TokioAsyncResolver>,
}

impl Resolver {
    async fn inner(&self) -> Result<&TokioAsyncResolver> {
        self.inner
            .get_or_try_init(|| async {
                TokioAsyncResolver::tokio_from_system_conf().or_else(|_| {
                    TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
                })
            })
            .await
            .map_err(|e| Error::Resolve {
                host: String::new(),
                reason: e.to_string(),
            })
    }

    pub async fn resolve(&self, host: &Host) -> Result<SocketAddr> {
        let s = match host {
            Host::A(addr) => return Ok(*addr),
            Host::S(s) => s,
        };

        if let Ok(ip) = s.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, s.port));
        }

        let lookup = self
            .inner()
            .await?
            .lookup_ip(s.host.as_str())
            .await
            .map_err(|e| Error::Resolve {
                host: s.host.clone(),
                reason: e.to_string(),
            })?;

        let ip = pick_address(lookup.iter()).ok_or_else(|| Error::Resolve {
            host: s.host.clone(),
            reason: "no addresses found".into(),
        })?;
        debug!(host = %s.host, %ip, "resolved host");

        Ok(SocketAddr::new(ip, s.port))
    }
}
