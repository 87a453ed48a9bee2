//! Test doubles shared by the session tests.

use std::{
    io::{self, Write},
    net::{Ipv4Addr, SocketAddr},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use maya_bridge_command::STREAM_FUNCTION;
use maya_bridge_core::{
    BridgeSettings, CommandSender, ConfigError, Endpoint, Notifier, SettingsSource,
    TransportError,
};
use maya_bridge_transport::{ConsoleBus, ConsolePublisher};

/// Settings source that counts loads.
pub struct CountingSource {
    settings: Mutex<BridgeSettings>,
    loads: AtomicUsize,
}

impl CountingSource {
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn local() -> Self {
        Self::new(BridgeSettings {
            maya_hostname: Some("127.0.0.1".to_string()),
            ..BridgeSettings::default()
        })
    }

    pub fn unconfigured() -> Self {
        Self::new(BridgeSettings {
            maya_hostname: None,
            ..BridgeSettings::default()
        })
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn update(&self, f: impl FnOnce(&mut BridgeSettings)) {
        f(&mut self.settings.lock().unwrap());
    }
}

impl SettingsSource for CountingSource {
    fn load(&self) -> Result<BridgeSettings, ConfigError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.settings.lock().unwrap().clone())
    }
}

/// Notifier that records every message.
#[derive(Default)]
pub struct RecordingNotifier(Mutex<Vec<String>>);

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error_message(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

/// Command sender standing in for a Maya session.
///
/// Records every command and applies stream control calls to a real
/// [`ConsolePublisher`], so console events reach the bridge's listener.
pub struct FakeMaya {
    sent: Mutex<Vec<(Endpoint, String)>>,
    fail_matching: Mutex<Option<String>>,
    publisher: Mutex<ConsolePublisher<ConsoleBus>>,
}

impl FakeMaya {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_matching: Mutex::new(None),
            publisher: Mutex::new(ConsolePublisher::bind(ConsoleBus::new()).unwrap()),
        }
    }

    /// Refuse connections for commands containing `pattern`.
    pub fn fail_when_contains(&self, pattern: &str) {
        *self.fail_matching.lock().unwrap() = Some(pattern.to_string());
    }

    pub fn refuse_all(&self) {
        self.fail_when_contains("");
    }

    pub fn sent(&self) -> Vec<(Endpoint, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text)| text).collect()
    }

    /// Stream control calls received so far, as `(enable, port)`.
    pub fn stream_calls(&self) -> Vec<(bool, u16)> {
        self.sent_texts()
            .iter()
            .filter_map(|text| parse_stream_call(text))
            .collect()
    }

    pub fn registrations(&self) -> usize {
        self.publisher.lock().unwrap().source().callback_count()
    }

    pub fn emit(&self, message: &str, kind: maya_bridge_transport::MessageKind) {
        self.publisher
            .lock()
            .unwrap()
            .source_mut()
            .emit(message, kind)
            .unwrap();
    }
}

fn parse_stream_call(text: &str) -> Option<(bool, u16)> {
    let call = format!("{STREAM_FUNCTION}(");
    let start = text.find(&call)? + call.len();
    let rest = &text[start..];
    let enable = if rest.starts_with("True") {
        true
    } else if rest.starts_with("False") {
        false
    } else {
        return None;
    };
    let port_start = rest.find("port=")? + "port=".len();
    let digits: String = rest[port_start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    Some((enable, digits.parse().ok()?))
}

#[async_trait]
impl CommandSender for FakeMaya {
    async fn send(&self, endpoint: &Endpoint, payload: &[u8]) -> Result<(), TransportError> {
        let text = String::from_utf8_lossy(payload).into_owned();
        let refused = self
            .fail_matching
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|pattern| text.contains(pattern));
        if refused {
            return Err(TransportError::Connect {
                endpoint: endpoint.clone(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }

        if let Some((enable, port)) = parse_stream_call(&text) {
            let target = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
            self.publisher.lock().unwrap().configure(enable, target);
        }
        self.sent.lock().unwrap().push((endpoint.clone(), text));
        Ok(())
    }
}

/// Writer collecting listener output.
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[cfg(test)]
mod tests {
    use maya_bridge_command::{PUBLISHER_SCRIPT, WireCommand, WrapOptions, stream_control_call};

    use super::*;

    #[test]
    fn test_parse_stream_call_from_wrapped_command() {
        let target: SocketAddr = "127.0.0.1:40123".parse().unwrap();
        let wrap = WrapOptions {
            isolated_namespace: true,
            wrap_undo: false,
        };
        let command =
            WireCommand::control(stream_control_call(true, target).unwrap(), wrap).unwrap();
        assert_eq!(
            parse_stream_call(&command.render().unwrap()),
            Some((true, 40123))
        );
        assert_eq!(parse_stream_call(PUBLISHER_SCRIPT), None);
    }
}
