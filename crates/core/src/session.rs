//! Session store (C7): per-device OMA DM sessions, keyed by `session_id`.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::auth;

/// Session state machine states (§4.8). `Error` absorbs a session that hit
/// an unrecoverable condition; the server does not currently transition
/// into it automatically, but callers may set it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Authenticated,
    Management,
    UpdateAvailable,
    Downloading,
    Complete,
    Error,
}

/// Device identity harvested incrementally from `Results` items.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub device_id: String,
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub software_version: String,
    pub hardware_version: String,
    pub current_build: String,
    pub dm_version: String,
    pub language: String,
}

/// A device's reported status for one previously-sent command, keyed by
/// `cmd_ref + "_" + target_ref`.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub cmd: Option<String>,
    pub status: u32,
    pub target: String,
}

#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub device_id: String,
    pub state: SessionState,
    pub msg_id_counter: u64,
    pub created_at: Instant,
    pub last_activity: Instant,
    pub device_info: DeviceInfo,
    pub authenticated: bool,
    pub username: String,
    pub client_nonce: Vec<u8>,
    pub server_nonce: Vec<u8>,
    pub command_results: HashMap<String, CommandResult>,
    /// URL of the package selected by the last `check_update_available` call,
    /// so a later `Get` for `PkgURL` can hand it back (§4.8 item 5).
    pub selected_package_url: Option<String>,
}

impl Session {
    fn new(session_id: &str, device_id: &str) -> Self {
        let now = Instant::now();
        Session {
            session_id: session_id.to_string(),
            device_id: device_id.to_string(),
            state: SessionState::Init,
            msg_id_counter: 0,
            created_at: now,
            last_activity: now,
            device_info: DeviceInfo::default(),
            authenticated: false,
            username: String::new(),
            client_nonce: Vec::new(),
            server_nonce: auth::generate_nonce().to_vec(),
            command_results: HashMap::new(),
            selected_package_url: None,
        }
    }

    /// Advance and return the next message ID the server will emit.
    pub fn next_msg_id(&mut self) -> u64 {
        self.msg_id_counter += 1;
        self.last_activity = Instant::now();
        self.msg_id_counter
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn record_command_result(&mut self, cmd_ref: &str, target_ref: &str, cmd: Option<String>, status: u32) {
        let key = format!("{cmd_ref}_{target_ref}");
        self.command_results.insert(
            key,
            CommandResult {
                cmd,
                status,
                target: target_ref.to_string(),
            },
        );
    }

    /// Update device info from a DM tree path, matching by case-insensitive
    /// substring on the path so minor path variations across firmware
    /// builds don't break harvesting.
    pub fn update_device_info(&mut self, path: &str, value: &str) {
        let path_lower = path.to_lowercase();
        let info = &mut self.device_info;

        if path_lower.contains("devid") {
            info.device_id = value.to_string();
        } else if path_lower.contains("man") && !path_lower.contains("command") {
            info.manufacturer = value.to_string();
        } else if path_lower.contains("mod") {
            info.model = value.to_string();
        } else if path_lower.contains("fwv") || path_lower.contains("fmv") {
            info.firmware_version = value.to_string();
        } else if path_lower.contains("swv") {
            info.software_version = value.to_string();
        } else if path_lower.contains("hwv") {
            info.hardware_version = value.to_string();
        } else if path_lower.contains("build") {
            info.current_build = value.to_string();
        } else if path_lower.contains("dmv") {
            info.dm_version = value.to_string();
        } else if path_lower.contains("lang") {
            info.language = value.to_string();
        }
    }
}

/// A read-only view of a session, for diagnostic listing.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub device_id: String,
    pub state: SessionState,
    pub authenticated: bool,
    pub model: String,
    pub manufacturer: String,
    pub current_build: String,
    pub firmware_version: String,
    pub msg_id: u64,
}

/// Concurrent session store keyed by `session_id`. A single mutex is
/// sufficient: each device holds at most one in-flight message, so
/// contention is low (§5).
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Run `f` with exclusive access to the session for `(device_id,
    /// session_id)`, creating it if it doesn't exist or has expired.
    pub async fn with_session<F, R>(&self, device_id: &str, session_id: &str, f: F) -> R
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.sessions.lock().await;

        let needs_fresh = match sessions.get(session_id) {
            Some(s) => s.is_expired(self.timeout),
            None => true,
        };
        if needs_fresh {
            sessions.insert(session_id.to_string(), Session::new(session_id, device_id));
        }

        let session = sessions
            .get_mut(session_id)
            .expect("just inserted or confirmed present above");
        f(session)
    }

    /// Remove sessions that have been idle past the configured timeout.
    /// Safe to run concurrently with `with_session`: both hold the same
    /// mutex, so a sweep never evicts a session mid-mutation.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.timeout));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .lock()
            .await
            .values()
            .map(|s| SessionSnapshot {
                session_id: s.session_id.clone(),
                device_id: s.device_id.clone(),
                state: s.state,
                authenticated: s.authenticated,
                model: s.device_info.model.clone(),
                manufacturer: s.device_info.manufacturer.clone(),
                current_build: s.device_info.current_build.clone(),
                firmware_version: s.device_info.firmware_version.clone(),
                msg_id: s.msg_id_counter,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_reuses_existing_session() {
        let store = SessionStore::new(Duration::from_secs(3600));
        store.with_session("DEV-A", "42", |s| s.authenticated = true).await;
        let still_authenticated = store.with_session("DEV-A", "42", |s| s.authenticated).await;
        assert!(still_authenticated);
    }

    #[tokio::test]
    async fn expired_session_is_replaced() {
        let store = SessionStore::new(Duration::from_millis(1));
        store.with_session("DEV-A", "42", |s| s.authenticated = true).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let authenticated = store.with_session("DEV-A", "42", |s| s.authenticated).await;
        assert!(!authenticated);
    }

    #[test]
    fn update_device_info_matches_by_substring() {
        let mut session = Session::new("1", "DEV-A");
        session.update_device_info("./DevInfo/Mod", "Topaz");
        session.update_device_info("./Software/Build", "Nova-3.0.5-64");
        session.update_device_info("./DevInfo/Man", "HP");
        assert_eq!(session.device_info.model, "Topaz");
        assert_eq!(session.device_info.current_build, "Nova-3.0.5-64");
        assert_eq!(session.device_info.manufacturer, "HP");
    }

    #[test]
    fn manufacturer_is_not_matched_from_command_paths() {
        let mut session = Session::new("1", "DEV-A");
        session.update_device_info("./DevInfo/CommandPath", "ignored");
        assert_eq!(session.device_info.manufacturer, "");
    }
}
