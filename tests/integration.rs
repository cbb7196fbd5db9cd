use embedded_httpd::{Connection, Input, ObjectContext, Request, RequestContext, Response, Settings, Socket, WriteOutcome, Writer};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn socket_on(port: u16) -> Socket {
    Socket::new(Settings::parse([("port", &port.to_string())]).unwrap()).unwrap()
}

fn roundtrip(port: u16, request: &str) -> String {
    std::thread::sleep(Duration::from_millis(80));
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    response
}

#[test]
fn s1_happy_path_get() {
    let port = free_port();
    let socket = Arc::new(socket_on(port));
    socket
        .listen_with(
            |ctx: &mut RequestContext| {
                ctx.connection.send_bytes(
                    Response::new(200).with_content_type(mime::TEXT_PLAIN),
                    "hi",
                );
                Input::none()
            },
            || {},
        )
        .unwrap();

    let response = roundtrip(
        port,
        "GET /x HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n",
    );
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Length: 2\r\n"));
    assert!(response.ends_with("hi"));

    socket.release();
    assert!(socket.wait(5000));
}

#[test]
fn s2_default_404() {
    let port = free_port();
    let socket = Arc::new(socket_on(port));
    socket.listen_with(|_ctx: &mut RequestContext| Input::none(), || {}).unwrap();

    let response = roundtrip(
        port,
        "GET /missing HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n",
    );
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.ends_with(NOT_FOUND_BODY));

    socket.release();
    assert!(socket.wait(5000));
}

const NOT_FOUND_BODY: &str = "<!doctype html><html><head><title>Not Found</title></head><body><h1>Not Found</h1></body></html>";

#[test]
fn s3_panic_becomes_500() {
    let port = free_port();
    let socket = Arc::new(socket_on(port));
    socket
        .listen_with(
            |_ctx: &mut RequestContext| -> Input { panic!("boom") },
            || {},
        )
        .unwrap();

    let response = roundtrip(
        port,
        "GET / HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n",
    );
    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));

    socket.release();
    assert!(socket.wait(5000));
}

#[test]
fn s4_basic_auth_challenge() {
    let port = free_port();
    let socket = Arc::new(socket_on(port));
    socket
        .listen_with(
            |ctx: &mut RequestContext| {
                ctx.connection
                    .send_bytes(Response::new(401).with_realm("r"), "");
                Input::none()
            },
            || {},
        )
        .unwrap();

    let response = roundtrip(
        port,
        "GET / HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n",
    );
    assert!(response.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
    assert!(response.contains("WWW-Authenticate: Basic realm=\"r\"\r\n"));

    socket.release();
    assert!(socket.wait(5000));
}

struct CountingWriter {
    calls: Arc<AtomicUsize>,
    sizes: Arc<std::sync::Mutex<Vec<usize>>>,
}

impl Writer for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> Result<WriteOutcome, embedded_httpd::BodyError> {
        if buf.is_empty() {
            return Ok(WriteOutcome::EndOfStream);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let take = buf.len().min(4096);
        self.sizes.lock().unwrap().push(take);
        Ok(WriteOutcome::Accepted(take))
    }
}

#[test]
fn s6_streaming_upload_last_call() {
    let port = free_port();
    let socket = Arc::new(socket_on(port));
    let calls = Arc::new(AtomicUsize::new(0));
    let sizes = Arc::new(std::sync::Mutex::new(Vec::new()));
    let calls_for_handler = Arc::clone(&calls);
    let sizes_for_handler = Arc::clone(&sizes);

    socket
        .listen_with(
            move |ctx: &mut RequestContext| {
                ctx.connection
                    .send_bytes(Response::new(200).with_content_type(mime::TEXT_PLAIN), "ok");
                Input::new(CountingWriter {
                    calls: Arc::clone(&calls_for_handler),
                    sizes: Arc::clone(&sizes_for_handler),
                })
            },
            || {},
        )
        .unwrap();

    std::thread::sleep(Duration::from_millis(80));
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let body = vec![b'a'; 10_000];
    let head = format!(
        "POST /upload HTTP/1.1\r\nHost: h\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).unwrap();
    stream.write_all(&body).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));

    let sizes = sizes.lock().unwrap().clone();
    assert_eq!(sizes, vec![4096, 4096, 1808]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    socket.release();
    assert!(socket.wait(5000));
}

#[test]
fn request_context_exposes_object_context() {
    let request = Request::new(
        embedded_httpd::RequestLine {
            version: "HTTP/1.1".into(),
            method: "GET".into(),
            url: "/".into(),
        },
        false,
        80,
        "127.0.0.1".into(),
        1234,
        std::iter::empty(),
    );
    let mut ctx = RequestContext::new(request);
    ctx.objects.insert("answer", 42i32);
    assert_eq!(ctx.objects.get::<i32>("answer"), Some(&42));
    let _: &Connection = &ctx.connection;
    let _: &ObjectContext = &ctx.objects;
}
