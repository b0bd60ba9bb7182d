use std::time::Duration;

use log::{debug, warn};

use super::wire::{self, DeviceStatus, WifiStatus};
use super::{Command, Device, DeviceError};
use crate::pattern::Grid;

/// The drum machine's firmware HTTP server, spoken to with plain GETs.
pub struct HttpDevice {
    agent: ureq::Agent,
    base:  String,
}

/// Accept `192.168.4.1`, `http://192.168.4.1/` and the like.
pub fn normalize_base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

impl HttpDevice {
    pub fn new(host: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self { agent, base: normalize_base_url(host) }
    }

    fn get(&self, endpoint: &str, params: &[(&'static str, String)]) -> Result<String, DeviceError> {
        let url = format!("{}{}", self.base, endpoint);
        let mut request = self.agent.get(&url);
        for (key, value) in params {
            request = request.query(key, value);
        }
        match request.call() {
            Ok(response) => response
                .into_string()
                .map_err(|e| DeviceError::Transport(format!("reading {}: {}", endpoint, e))),
            Err(ureq::Error::Status(status, _)) => Err(DeviceError::HttpStatus {
                endpoint: endpoint.to_string(),
                status,
            }),
            Err(ureq::Error::Transport(t)) => Err(DeviceError::Transport(t.to_string())),
        }
    }
}

impl Device for HttpDevice {
    fn send(&mut self, command: &Command) -> Result<(), DeviceError> {
        match self.get(command.endpoint(), &command.params()) {
            Ok(body) => {
                debug!("sent {} -> {:?}", command.path(), body.trim());
                Ok(())
            }
            Err(e) => {
                warn!("command {} failed: {}", command.path(), e);
                Err(e)
            }
        }
    }

    fn fetch_status(&mut self) -> Result<DeviceStatus, DeviceError> {
        let body = self.get("/status", &[])?;
        wire::parse_status(&body)
    }

    fn fetch_pattern(&mut self, index: usize) -> Result<Grid, DeviceError> {
        let body = self.get("/getpattern", &[])?;
        let grid = wire::parse_pattern(&body)?;
        debug!("pattern {} fetched ({} tracks)", index + 1, grid.len());
        Ok(grid)
    }

    fn fetch_wifi(&mut self) -> Result<WifiStatus, DeviceError> {
        let body = self.get("/wifi", &[])?;
        wire::parse_wifi(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serve exactly one canned response and report the request line.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() { break; }
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line, body.len(), body
            )
            .unwrap();
            stream.flush().unwrap();
            tx.send(request_line.trim().to_string()).unwrap();
        });
        (format!("127.0.0.1:{}", addr.port()), rx)
    }

    fn device(host: &str) -> HttpDevice {
        HttpDevice::new(host, Duration::from_secs(2))
    }

    #[test]
    fn base_url_normalization() {
        assert_eq!(normalize_base_url("192.168.4.1"), "http://192.168.4.1");
        assert_eq!(normalize_base_url("http://red808.local/"), "http://red808.local");
        assert_eq!(normalize_base_url(" https://x:8080 "), "https://x:8080");
    }

    #[test]
    fn status_is_fetched_and_parsed() {
        let (host, rx) = serve_once("200 OK", r#"{"bpm":128,"playing":true}"#);
        let status = device(&host).fetch_status().unwrap();
        assert_eq!(status.bpm, Some(128));
        assert_eq!(status.playing, Some(true));
        assert_eq!(rx.recv().unwrap(), "GET /status HTTP/1.1");
    }

    #[test]
    fn command_params_go_in_the_query_string() {
        let (host, rx) = serve_once("200 OK", "OK");
        let cmd = Command::Step { pattern: 1, track: 2, step: 3, value: true };
        device(&host).send(&cmd).unwrap();
        assert_eq!(rx.recv().unwrap(), "GET /step?pattern=1&track=2&step=3&value=1 HTTP/1.1");
    }

    #[test]
    fn non_2xx_is_an_http_status_error() {
        let (host, _rx) = serve_once("500 Internal Server Error", "{}");
        let err = device(&host).fetch_status().unwrap_err();
        assert_eq!(err, DeviceError::HttpStatus { endpoint: "/status".into(), status: 500 });
    }

    #[test]
    fn bad_body_is_malformed() {
        let (host, _rx) = serve_once("200 OK", "not json");
        let err = device(&host).fetch_pattern(0).unwrap_err();
        assert!(matches!(err, DeviceError::MalformedResponse { .. }));
    }

    #[test]
    fn unreachable_device_is_a_transport_error() {
        // bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let err = device(&format!("127.0.0.1:{}", port)).send(&Command::Play).unwrap_err();
        assert!(matches!(err, DeviceError::Transport(_)));
        assert!(err.is_transient());
    }
}
