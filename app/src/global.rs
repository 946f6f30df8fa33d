use crate::types::Subscriber;

use once_cell::sync::Lazy;
use std::{env, sync::Arc};
use tokio::sync::Mutex;

pub static SOCKET_PATH: Lazy<String> = Lazy::new(|| {
    env::var("XDG_RUNTIME_DIR")
        .map(|value| format!("{}/papertraild.sock", value))
        .unwrap_or_else(|_| "/tmp/papertraild.sock".to_string())
});

pub static SUBSCRIBERS: Lazy<Arc<Mutex<Subscriber>>> =
    Lazy::new(|| Arc::new(Mutex::new(Subscriber::new())));

pub static BUFFER_SIZE: Lazy<usize> = Lazy::new(|| 8192);
