//! Shared helpers for integration tests
//!
//! [`Screen`] is a reference UI: it applies `ext_linegrid` redraw batches
//! to its own grid exactly as a real UI would. [`TestUi`] drives a host
//! through the library's own channel manager.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedhost::transport::SpawnConfig;
use embedhost::{ChannelId, ChannelManager, Result, Session, Value};

pub const WAIT: Duration = Duration::from_secs(10);

/// Scratch directories handed to host processes through XDG variables
pub struct TestContext {
    pub temp: tempfile::TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        for dir in ["config", "data", "runtime"] {
            std::fs::create_dir_all(temp.path().join(dir)).expect("Failed to create dir");
        }
        Self { temp }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    pub fn bin() -> PathBuf {
        PathBuf::from(env!("CARGO_BIN_EXE_embedhost"))
    }

    pub fn env(&self) -> Vec<(&'static str, PathBuf)> {
        vec![
            ("XDG_CONFIG_HOME", self.path("config")),
            ("XDG_DATA_HOME", self.path("data")),
            ("XDG_RUNTIME_DIR", self.path("runtime")),
        ]
    }

    /// Spawn configuration for the host binary with this context's env
    pub fn host_command<I, S>(&self, args: I) -> SpawnConfig
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = SpawnConfig::new(Self::bin())
            .args(args)
            .env("RUST_LOG", "warn");
        for (key, value) in self.env() {
            config = config.env(key, value.to_string_lossy().into_owned());
        }
        config
    }

    /// `tokio::process::Command` for hosts the test does not talk to
    /// over stdio
    pub fn process(&self, args: &[&str]) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(Self::bin());
        command.args(args).env("RUST_LOG", "warn").kill_on_drop(true);
        for (key, value) in self.env() {
            command.env(key, value);
        }
        command
    }
}

/// A UI's mirror of the host grid
#[derive(Debug, Clone, Default)]
pub struct Screen {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<Vec<(String, i64)>>,
    pub cursor: (usize, usize),
    pub default_colors: Option<Vec<i64>>,
    pub default_colors_events: usize,
    pub flushes: usize,
    /// Every text row ever written, for "was this ever shown" checks
    pub history: Vec<String>,
}

fn int(value: &Value) -> i64 {
    value.as_i64().expect("expected integer")
}

fn uint(value: &Value) -> usize {
    usize::try_from(int(value)).expect("expected non-negative integer")
}

impl Screen {
    fn blank_row(&self) -> Vec<(String, i64)> {
        vec![(" ".to_string(), 0); self.width]
    }

    /// Apply one `redraw` notification
    pub fn apply(&mut self, batch: &[Value]) {
        for item in batch {
            let item = item.as_array().expect("redraw item must be an array");
            let name = item[0].as_str().expect("event name");
            for call in &item[1..] {
                let args = call.as_array().expect("event args");
                self.apply_event(name, args);
            }
        }
    }

    fn apply_event(&mut self, name: &str, args: &[Value]) {
        match name {
            "grid_resize" => {
                self.width = uint(&args[1]);
                self.height = uint(&args[2]);
                self.cells = vec![self.blank_row(); self.height];
            }
            "grid_clear" => {
                self.cells = vec![self.blank_row(); self.height];
            }
            "grid_line" => {
                let row = uint(&args[1]);
                let mut col = uint(&args[2]);
                let mut hl = 0;
                for cell in args[3].as_array().expect("cells") {
                    let cell = cell.as_array().expect("cell");
                    let text = cell[0].as_str().expect("cell text").to_string();
                    if let Some(id) = cell.get(1) {
                        hl = int(id);
                    }
                    let repeat = cell.get(2).map(uint).unwrap_or(1);
                    for _ in 0..repeat {
                        self.cells[row][col] = (text.clone(), hl);
                        col += 1;
                    }
                }
                let text = self.row_text(row);
                self.history.push(text);
            }
            "grid_cursor_goto" => {
                self.cursor = (uint(&args[1]), uint(&args[2]));
            }
            "grid_scroll" => {
                let (top, bot) = (uint(&args[1]), uint(&args[2]));
                let (left, right) = (uint(&args[3]), uint(&args[4]));
                let rows = uint(&args[5]);
                for row in top..bot {
                    for col in left..right {
                        self.cells[row][col] = if row + rows < bot {
                            self.cells[row + rows][col].clone()
                        } else {
                            (" ".to_string(), 0)
                        };
                    }
                }
            }
            "default_colors_set" => {
                self.default_colors = Some(args.iter().map(int).collect());
                self.default_colors_events += 1;
            }
            "flush" => self.flushes += 1,
            // Attribute definitions do not affect text
            "hl_attr_define" => {}
            other => panic!("unexpected redraw event {other}"),
        }
    }

    pub fn row_text(&self, row: usize) -> String {
        self.cells
            .get(row)
            .map(|cells| cells.iter().map(|(text, _)| text.as_str()).collect::<String>())
            .unwrap_or_default()
            .trim_end()
            .to_string()
    }

    pub fn rows(&self) -> Vec<String> {
        (0..self.height).map(|row| self.row_text(row)).collect()
    }

    pub fn row_hl(&self, row: usize) -> i64 {
        self.cells[row][0].1
    }
}

/// One channel to a host plus a screen mirror fed by its redraws
pub struct TestUi {
    pub channels: ChannelManager,
    pub id: ChannelId,
    pub session: Session,
    pub screen: Arc<Mutex<Screen>>,
}

impl TestUi {
    fn wrap(channels: ChannelManager, id: ChannelId) -> Self {
        let session = channels.channel_for(id).expect("channel just registered");
        let screen = Arc::new(Mutex::new(Screen::default()));
        session.on_notification("redraw", {
            let screen = screen.clone();
            move |batch| screen.lock().unwrap().apply(&batch)
        });
        Self {
            channels,
            id,
            session,
            screen,
        }
    }

    pub fn spawn(config: SpawnConfig) -> Self {
        let (mut channels, _inbound) = ChannelManager::new();
        let id = channels.spawn_channel(config).expect("Failed to spawn host");
        Self::wrap(channels, id)
    }

    pub async fn connect(address: &str) -> Self {
        let (mut channels, _inbound) = ChannelManager::new();
        let id = channels
            .connect_channel(address)
            .await
            .expect("Failed to connect to host");
        Self::wrap(channels, id)
    }

    pub async fn request(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        tokio::time::timeout(WAIT, self.session.request(method, args))
            .await
            .unwrap_or_else(|_| panic!("{method} timed out"))
    }

    pub async fn attach(&self, width: i64, height: i64) -> Result<Value> {
        self.request(
            "ui_attach",
            vec![
                Value::from(width),
                Value::from(height),
                Value::map([("ext_linegrid", Value::from(true))]),
            ],
        )
        .await
    }

    /// Channel id the host assigned to this connection
    pub async fn host_side_id(&self) -> i64 {
        let info = self.request("get_api_info", vec![]).await.unwrap();
        info.as_array().unwrap()[0].as_i64().unwrap()
    }

    pub async fn lifecycle_log(&self) -> Vec<Value> {
        let log = self.request("get_lifecycle_log", vec![]).await.unwrap();
        log.as_array().unwrap().to_vec()
    }

    /// Poll the mirror until `done` holds after a flush
    pub async fn wait_for<F>(&self, what: &str, done: F) -> Screen
    where
        F: Fn(&Screen) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            {
                let screen = self.screen.lock().unwrap();
                if screen.flushes > 0 && done(&screen) {
                    return screen.clone();
                }
                if tokio::time::Instant::now() >= deadline {
                    panic!("timed out waiting for {what}; screen: {:#?}", screen.rows());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

pub fn lifecycle_entry(name: &str, channel: Option<i64>) -> Value {
    let mut entry = vec![Value::from(name)];
    entry.extend(channel.map(Value::from));
    Value::Array(entry)
}

/// Wait for a file to appear
pub async fn wait_for_path(path: &Path) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !path.exists() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} never appeared",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
