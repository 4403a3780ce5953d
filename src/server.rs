use crate::{
    errors::{Error, Result},
    models::{InfoResponse, PlayersInfoResponse, StatsResponse},
    net::{DefaultDialer, Dialer},
    protocols::{
        a2s::{self, Challenge},
        rcon,
    },
    tcp::TcpTransport,
    udp::UdpTransport,
};

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, instrument::WithSubscriber, Dispatch, Instrument, Span};

/// Deadlines applied to every single network call. They are re-armed on each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub connect: Duration,
    pub udp_read: Duration,
    pub tcp_read: Duration,
    pub tcp_write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(1),
            udp_read: Duration::from_secs(1),
            tcp_read: Duration::from_secs(5),
            tcp_write: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Default)]
pub struct ConnectOptions {
    dialer: Option<Arc<dyn Dialer>>,
    rcon_password: Option<String>,
    timeouts: Timeouts,
    dispatch: Option<Dispatch>,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("dialer", &self.dialer.as_ref().map(|_| "<Dialer>"))
            .field("rcon_password", &self.rcon_password.as_ref().map(|_| "<hidden>"))
            .field("timeouts", &self.timeouts)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

impl ConnectOptions {
    /// Replaces the default socket factory.
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    /// Opens and authenticates an RCON connection on connect. An empty password means no RCON.
    pub fn with_rcon_password(mut self, password: impl Into<String>) -> Self {
        self.rcon_password = Some(password.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Routes this server's diagnostics to `dispatch` instead of the current default subscriber.
    pub fn with_dispatch(mut self, dispatch: impl Into<Dispatch>) -> Self {
        self.dispatch = Some(dispatch.into());
        self
    }
}

async fn with_dispatch<F: Future>(dispatch: Option<Dispatch>, fut: F) -> F::Output {
    match dispatch {
        Some(dispatch) => fut.with_subscriber(dispatch).await,
        None => fut.await,
    }
}

struct Inner {
    udp: Option<UdpTransport>,
    rcon: Option<rcon::Client>,
}

impl Inner {
    fn udp(&self) -> Result<&UdpTransport> {
        self.udp.as_ref().ok_or(Error::NotInitialized)
    }
}

/// A Source engine game server: one query socket and, if a password was given, one
/// authenticated RCON connection.
///
/// Every operation holds the same lock for its whole exchange, so concurrent callers queue
/// up instead of interleaving packets. [`Server::close`] does not queue: it aborts the
/// exchange in flight, which then fails with [`Error::ConnectionClosed`].
pub struct Server {
    addr: String,
    inner: Mutex<Inner>,
    shutdown: CancellationToken,
    span: Span,
    dispatch: Option<Dispatch>,
}

impl Server {
    pub async fn connect(addr: &str, opts: ConnectOptions) -> Result<Self> {
        if addr.is_empty() {
            return Err(Error::MissingAddress);
        }

        let dispatch = opts.dispatch.clone();
        let span = match &dispatch {
            Some(d) => tracing::dispatcher::with_default(d, || debug_span!("server", %addr)),
            None => debug_span!("server", %addr),
        };

        let inner = with_dispatch(
            dispatch.clone(),
            Self::open(addr, opts).instrument(span.clone()),
        )
        .await?;

        Ok(Self {
            addr: addr.to_string(),
            inner: Mutex::new(inner),
            shutdown: CancellationToken::new(),
            span,
            dispatch,
        })
    }

    async fn open(addr: &str, opts: ConnectOptions) -> Result<Inner> {
        let timeouts = opts.timeouts;
        let dialer = opts
            .dialer
            .unwrap_or_else(|| Arc::new(DefaultDialer::new(timeouts.connect)));

        let mut udp = UdpTransport::open(&*dialer, addr, timeouts.udp_read).await?;

        let rcon = match opts.rcon_password.as_deref() {
            None | Some("") => None,
            Some(password) => match Self::open_rcon(&*dialer, addr, password, &timeouts).await {
                Ok(client) => Some(client),
                Err(e) => {
                    udp.close();
                    return Err(e);
                }
            },
        };

        Ok(Inner {
            udp: Some(udp),
            rcon,
        })
    }

    async fn open_rcon(
        dialer: &dyn Dialer,
        addr: &str,
        password: &str,
        timeouts: &Timeouts,
    ) -> Result<rcon::Client> {
        debug!("connecting rcon");
        let transport =
            TcpTransport::open(dialer, addr, timeouts.tcp_read, timeouts.tcp_write).await?;

        let mut client = rcon::Client::new(transport);
        if let Err(e) = client.authenticate(password).await {
            client.close().await;
            return Err(e);
        }
        Ok(client)
    }

    async fn scoped<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.shutdown.is_cancelled() {
            return Err(Error::NotInitialized);
        }

        let guarded = async {
            tokio::select! {
                res = fut => res,
                _ = self.shutdown.cancelled() => {
                    debug!("operation aborted by close");
                    Err(Error::ConnectionClosed)
                }
            }
        };
        with_dispatch(self.dispatch.clone(), guarded.instrument(self.span.clone())).await
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Round-trip time of an info query. The reply is not parsed.
    pub async fn ping(&self) -> Result<Duration> {
        self.scoped(async {
            let inner = self.inner.lock().await;
            let udp = inner.udp()?;

            let start = Instant::now();
            udp.send(&a2s::Request::Info.to_bytes()).await?;
            udp.receive().await?;
            let elapsed = start.elapsed();

            debug!(?elapsed, "ping");
            Ok(elapsed)
        })
        .await
    }

    pub async fn info(&self) -> Result<InfoResponse> {
        self.scoped(async {
            let inner = self.inner.lock().await;
            let udp = inner.udp()?;

            udp.send(&a2s::Request::Info.to_bytes()).await?;
            debug!("receiving info response");
            let data = udp.receive().await?;

            a2s::parse_info_response(&data)
        })
        .await
    }

    /// Fetches the player list, answering the server's challenge first when it sends one.
    pub async fn players_info(&self) -> Result<PlayersInfoResponse> {
        self.scoped(async {
            let inner = self.inner.lock().await;
            let udp = inner.udp()?;

            let request = a2s::Request::Players {
                challenge: Challenge::default(),
            };
            udp.send(&request.to_bytes()).await?;
            let data = udp.receive().await?;

            match a2s::Response::from_bytes(&data, a2s::PLAYERS_RESPONSE)? {
                a2s::Response::Players(players) => Ok(players),
                a2s::Response::PlayersChallenge(challenge) => {
                    debug!(challenge = challenge.0, "received players challenge");
                    udp.send(&a2s::Request::Players { challenge }.to_bytes())
                        .await?;
                    let data = udp.receive().await?;
                    a2s::parse_players_response(&data)
                }
                other => Err(Error::BadHeader {
                    expected: a2s::PLAYERS_RESPONSE,
                    found: other.header(),
                }),
            }
        })
        .await
    }

    /// Runs a console command over RCON and returns its complete output.
    pub async fn send(&self, cmd: &str) -> Result<String> {
        self.scoped(async {
            let mut inner = self.inner.lock().await;
            inner.udp()?;
            let client = inner.rcon.as_mut().ok_or(Error::RconNotInitialized)?;

            client.exec(cmd).await
        })
        .await
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        let output = self.send("stats").await?;
        StatsResponse::parse(&output)
    }

    /// Releases both connections. Later calls fail with [`Error::NotInitialized`].
    pub async fn close(&self) {
        self.shutdown.cancel();

        let release = async {
            // free as soon as the aborted operation has dropped its guard
            let mut inner = self.inner.lock().await;
            if let Some(mut client) = inner.rcon.take() {
                client.close().await;
            }
            if let Some(mut udp) = inner.udp.take() {
                udp.close();
            }
        };
        with_dispatch(self.dispatch.clone(), release.instrument(self.span.clone())).await
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.addr)
    }
}
