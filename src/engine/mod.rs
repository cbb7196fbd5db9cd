//! the TCP accept loop, worker pool, and HTTP/1.1 head/body framing that feed a
//! [`Socket`](crate::Socket)'s per-exchange callbacks.
//!
//! this module carries none of the three core subsystems' engineering value; it exists only so
//! the crate is a runnable, self-contained HTTP/1.1 server rather than a thin shim over an
//! external parsing engine.

mod exchange;
mod head;
mod pool;
mod transport;

use crate::error::{Result, ServerError};
use crate::request_context::RequestHandler;
use crate::ServerTlsConfig;
use pool::ThreadPool;
use std::collections::HashMap;
use std::net::{IpAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use transport::Transport;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A running engine instance backing one [`Socket`](crate::Socket)'s `listen` call.
pub(crate) struct Daemon {
    shutdown: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

struct Limits {
    connection_limit: u32,
    per_ip_connection_limit: u32,
    active_total: AtomicUsize,
    active_per_ip: Mutex<HashMap<IpAddr, usize>>,
}

impl Limits {
    fn try_acquire(&self, ip: IpAddr) -> bool {
        if self.active_total.load(Ordering::SeqCst) as u32 >= self.connection_limit {
            return false;
        }
        if self.per_ip_connection_limit > 0 {
            let mut per_ip = self.active_per_ip.lock().unwrap();
            let count = per_ip.entry(ip).or_insert(0);
            if *count as u32 >= self.per_ip_connection_limit {
                return false;
            }
            *count += 1;
        }
        self.active_total.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn release(&self, ip: IpAddr) {
        self.active_total.fetch_sub(1, Ordering::SeqCst);
        if self.per_ip_connection_limit > 0 {
            let mut per_ip = self.active_per_ip.lock().unwrap();
            if let Some(count) = per_ip.get_mut(&ip) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    per_ip.remove(&ip);
                }
            }
        }
    }
}

impl Daemon {
    /// Bind and start accepting connections on `settings.port`, dispatching each one to a
    /// worker thread that drives it through [`exchange::serve_connection`].
    pub(crate) fn start(
        settings: crate::settings::Settings,
        tls_server_config: Option<ServerTlsConfig>,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", settings.port)).map_err(ServerError::from)?;
        listener
            .set_nonblocking(true)
            .map_err(ServerError::from)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let read_timeout = Duration::from_secs(settings.connection_timeout_sec as u64);
        let host_port = settings.port;

        let limits = Arc::new(Limits {
            connection_limit: settings.connection_limit,
            per_ip_connection_limit: settings.per_ip_connection_limit,
            active_total: AtomicUsize::new(0),
            active_per_ip: Mutex::new(HashMap::new()),
        });

        let accept_shutdown = Arc::clone(&shutdown);
        let accept_thread = thread::Builder::new()
            .name("engine-acceptor".into())
            .spawn(move || {
                let mut pool = ThreadPool::new(settings.num_threads);
                accept_loop(
                    listener,
                    &accept_shutdown,
                    &pool,
                    &limits,
                    read_timeout,
                    host_port,
                    tls_server_config,
                    handler,
                );
                pool.join();
            })
            .expect("failed to spawn acceptor thread");

        Ok(Self {
            shutdown,
            accept_thread: Some(accept_thread),
        })
    }

    /// Signal the accept loop to stop and join the acceptor thread (which in turn joins every
    /// worker). blocks until no handler invocation can happen again for this daemon.
    pub(crate) fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.accept_thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.accept_thread.take() {
            let _ = thread.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn accept_loop(
    listener: TcpListener,
    shutdown: &AtomicBool,
    pool: &ThreadPool,
    limits: &Arc<Limits>,
    read_timeout: Duration,
    host_port: u16,
    tls_server_config: Option<ServerTlsConfig>,
    handler: Arc<dyn RequestHandler>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, remote_addr)) => {
                let ip = remote_addr.ip();
                if !limits.try_acquire(ip) {
                    log::debug!("rejecting connection from {remote_addr}: limit reached");
                    continue;
                }

                let _ = stream.set_nonblocking(false);
                let _ = stream.set_read_timeout(Some(read_timeout));

                let limits = Arc::clone(limits);
                let handler = Arc::clone(&handler);
                let tls_server_config = tls_server_config.clone();
                pool.execute(move || {
                    handle_connection(stream, remote_addr, host_port, tls_server_config, &handler);
                    limits.release(ip);
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                log::error!("accept failed: {err}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
}

fn handle_connection(
    stream: TcpStream,
    remote_addr: std::net::SocketAddr,
    host_port: u16,
    tls_server_config: Option<ServerTlsConfig>,
    handler: &Arc<dyn RequestHandler>,
) {
    #[cfg(feature = "tls")]
    if let Some(config) = tls_server_config {
        match rustls::ServerConnection::new(config) {
            Ok(session) => {
                let mut transport = Transport::Tls(Box::new(rustls::StreamOwned::new(session, stream)));
                exchange::serve_connection(&mut transport, handler.as_ref(), true, host_port, remote_addr);
            }
            Err(err) => log::error!("failed to start TLS session for {remote_addr}: {err}"),
        }
        return;
    }
    #[cfg(not(feature = "tls"))]
    let _ = tls_server_config;

    let mut transport = Transport::Plain(stream);
    exchange::serve_connection(&mut transport, handler.as_ref(), false, host_port, remote_addr);
}
