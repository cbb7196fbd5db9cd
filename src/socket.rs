use crate::engine::Daemon;
use crate::error::{Result, ServerError};
use crate::request_context::RequestHandler;
use crate::settings::Settings;
use crate::sni::Certs;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct State {
    daemon: Option<Daemon>,
    on_released: Option<Box<dyn FnOnce() + Send>>,
}

/// The listener: owns validated [`Settings`], a per-socket SNI certificate registry, and the
/// lifecycle of one engine daemon.
///
/// `Socket::new` only validates settings; nothing is bound until [`Socket::listen`] or
/// [`Socket::listen_with`] is called.
pub struct Socket {
    settings: Settings,
    certs: Arc<Certs>,
    state: Mutex<State>,
    released: Condvar,
}

impl Socket {
    /// Validate `settings` and prepare a not-yet-listening socket.
    pub fn new(settings: Settings) -> Result<Self> {
        Ok(Self {
            settings,
            certs: Arc::new(Certs::new()),
            state: Mutex::new(State {
                daemon: None,
                on_released: None,
            }),
            released: Condvar::new(),
        })
    }

    /// Bind a PEM certificate and private key to a hostname pattern (see [`Certs`] for the
    /// pattern grammar). Must be called before [`Socket::listen`]; fails with
    /// [`ServerError::Busy`] while the engine is running.
    pub fn add_tls_host(&self, pattern: &str, cert_pem: &[u8], key_pem: &[u8]) -> Result<()> {
        if self.state.lock().unwrap().daemon.is_some() {
            return Err(ServerError::Busy);
        }
        self.certs.add(pattern, cert_pem, key_pem)
    }

    /// Start the engine and block the calling thread until [`Socket::release`] is called.
    pub fn listen(&self, handler: impl RequestHandler) -> Result<()> {
        self.start(Arc::new(handler))?;
        self.wait(0);
        Ok(())
    }

    /// Start the engine and return immediately. `on_released` is invoked exactly once, after the
    /// engine has fully stopped.
    pub fn listen_with(
        &self,
        handler: impl RequestHandler,
        on_released: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.on_released = Some(Box::new(on_released));
        }
        self.start(Arc::new(handler))
    }

    fn start(&self, handler: Arc<dyn RequestHandler>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.daemon.is_some() {
            return Err(ServerError::Busy);
        }

        let tls_server_config = if self.settings.https {
            Some(self.build_tls_config()?)
        } else {
            None
        };

        let daemon = Daemon::start(self.settings, tls_server_config, handler)?;
        state.daemon = Some(daemon);
        log::debug!("listening on port {}", self.settings.port);
        Ok(())
    }

    #[cfg(feature = "tls")]
    fn build_tls_config(&self) -> Result<crate::ServerTlsConfig> {
        crate::tls::build_server_config(Arc::clone(&self.certs))
    }

    #[cfg(not(feature = "tls"))]
    fn build_tls_config(&self) -> Result<crate::ServerTlsConfig> {
        Err(ServerError::TlsUnavailable)
    }

    /// Stop the engine and fire `on_released`, if any. a no-op if not currently listening.
    pub fn release(&self) {
        let (daemon, on_released) = {
            let mut state = self.state.lock().unwrap();
            (state.daemon.take(), state.on_released.take())
        };

        let Some(daemon) = daemon else {
            return;
        };
        daemon.stop();
        if let Some(on_released) = on_released {
            on_released();
        }
        self.released.notify_all();
        log::debug!("released port {}", self.settings.port);
    }

    /// Block until released. `ms == 0` waits indefinitely; otherwise waits up to `ms`
    /// milliseconds. Returns `true` iff the socket is released at the moment of return.
    pub fn wait(&self, ms: u32) -> bool {
        let state = self.state.lock().unwrap();
        if ms == 0 {
            let _state = self
                .released
                .wait_while(state, |state| state.daemon.is_some())
                .unwrap();
            true
        } else {
            let (_state, timeout_result) = self
                .released
                .wait_timeout_while(state, Duration::from_millis(u64::from(ms)), |state| {
                    state.daemon.is_some()
                })
                .unwrap();
            !timeout_result.timed_out()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::body::Input;
    use crate::request_context::RequestContext;
    use std::io::Read;
    use std::net::TcpStream;
    use std::time::Duration;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn release_before_listen_is_a_noop() {
        let socket = Socket::new(Settings::parse([("port", "1")]).unwrap()).unwrap();
        socket.release();
    }

    #[test]
    fn listen_with_serves_http_and_release_unblocks_it() {
        let port = free_port();
        let settings = Settings::parse([("port", &port.to_string())]).unwrap();
        let socket = Arc::new(Socket::new(settings).unwrap());

        let released = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let released_flag = Arc::clone(&released);
        socket
            .listen_with(
                |ctx: &mut RequestContext| {
                    ctx.connection.send_bytes(
                        crate::Response::new(200).with_content_type(mime::TEXT_PLAIN),
                        "hi",
                    );
                    Input::none()
                },
                move || released_flag.store(true, std::sync::atomic::Ordering::SeqCst),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        use std::io::Write;
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("hi"));

        socket.release();
        assert!(socket.wait(5000));
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
    }
}
