//! Dispatch loop (C9): turns one incoming SyncML message into a response,
//! driving the per-session state machine described in the session module.

use crate::auth;
use crate::catalog::Catalog;
use crate::session::{SessionState, SessionStore};
use crate::syncml::{self, CommandKind, ItemSpec, ResponseBuilder, SyncMLCommand, SyncMLMessage, MetaKey};
use crate::wbxml::Element;

pub const ALERT_CLIENT_INITIATED: u32 = 1201;
pub const STATUS_OK: u32 = 200;
pub const STATUS_AUTH_ACCEPTED: u32 = 212;
pub const STATUS_CREDENTIALS_MISSING: u32 = 401;

const DEVICE_INFO_PATHS: &[&str] = &[
    "./DevInfo/DevId",
    "./DevInfo/Man",
    "./DevInfo/Mod",
    "./DevInfo/FwV",
    "./DevInfo/SwV",
    "./DevInfo/HwV",
    "./Software/Build",
];

/// Immutable values the dispatcher needs but does not own: server identity,
/// credentials, and the two behaviors left open by design (§9).
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub server_id: String,
    pub default_username: String,
    pub default_password: String,
    pub server_username: String,
    pub server_password: String,
    pub package_base_url: String,
    /// Reject a mismatched MAC with `Status 401` and an otherwise-empty body
    /// instead of the original's soft-accept. Default `false` for
    /// compatibility with devices that never learned the server's nonce.
    pub strict_auth: bool,
    /// `SyncHdr` status code on successful authentication. The source always
    /// sends `STATUS_OK`(200) despite referencing 212 (`STATUS_AUTH_ACCEPTED`)
    /// in its constants; this implementation defaults to 212 as §4.8 item 1
    /// describes, configurable back to 200 if a device chokes on it.
    pub auth_success_status: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            server_id: "SERVER-ID".to_string(),
            default_username: "guest".to_string(),
            default_password: "guest".to_string(),
            server_username: "guest".to_string(),
            server_password: "guest".to_string(),
            package_base_url: String::new(),
            strict_auth: false,
            auth_success_status: STATUS_AUTH_ACCEPTED,
        }
    }
}

/// The result of processing one request: the response element tree, plus
/// what's needed to sign it (the transport adapter serializes the tree and
/// computes the MAC over the resulting bytes, since the wire format -- XML
/// vs WBXML -- is a transport concern).
pub struct DispatchOutcome {
    pub response: Element,
    /// Whether the client presented an `x-syncml-hmac` header at all; the
    /// response only carries a MAC of its own when one did.
    pub should_sign: bool,
    /// The nonce to mix into the response MAC: the client's most recently
    /// published `NextNonce`, or empty if it never sent one.
    pub response_nonce: Vec<u8>,
}

fn package_url(config: &DispatchConfig, filename: &str) -> String {
    if config.package_base_url.is_empty() {
        format!("/packages/{filename}")
    } else {
        format!("{}/packages/{}", config.package_base_url.trim_end_matches('/'), filename)
    }
}

/// Process one request end to end: parse, authenticate, run the per-command
/// handlers, check for an applicable update, and assemble the response.
pub async fn handle_message(
    config: &DispatchConfig,
    sessions: &SessionStore,
    catalog: &Catalog,
    body: &[u8],
    content_type: &str,
    hmac_header: Option<&str>,
) -> crate::Result<DispatchOutcome> {
    let message = syncml::parse(body, content_type)?;
    let device_id = message.header.source.clone();
    let session_id = message.header.session_id.clone();
    let builder = ResponseBuilder::new();

    struct Phase1 {
        msg_id: String,
        target: String,
        source: String,
        statuses: Vec<Element>,
        commands: Vec<Element>,
        state: SessionState,
        device_build: String,
        device_model: Option<String>,
        response_nonce: Vec<u8>,
        should_sign: bool,
        rejected: bool,
    }

    let phase1 = sessions
        .with_session(&device_id, &session_id, |session| {
            if let Some(nonce) = message.header.meta.get(&MetaKey::NextNonce) {
                session.client_nonce = auth::decode_nonce(nonce);
            }

            let should_sign = hmac_header.is_some();
            let response_nonce = session.client_nonce.clone();

            if !session.authenticated {
                let verification = auth::verify_client(
                    hmac_header,
                    message.header.cred.as_ref(),
                    &config.default_username,
                    &config.default_password,
                    &session.server_nonce,
                    body,
                );

                match verification {
                    auth::Verification::Mismatched if config.strict_auth => {
                        let status = builder.build_status(
                            &message.header.msg_id,
                            "0",
                            "SyncHdr",
                            STATUS_CREDENTIALS_MISSING,
                            Some(&message.header.target),
                            Some(&message.header.source),
                        );
                        let msg_id = session.next_msg_id().to_string();
                        return Phase1 {
                            msg_id,
                            target: message.header.source.clone(),
                            source: config.server_id.clone(),
                            statuses: vec![status],
                            commands: Vec::new(),
                            state: session.state,
                            device_build: String::new(),
                            device_model: None,
                            response_nonce,
                            should_sign,
                            rejected: true,
                        };
                    }
                    auth::Verification::Mismatched => {
                        log::warn!(
                            "session {session_id}: client MAC did not match the expected value; accepting anyway"
                        );
                        session.authenticated = true;
                    }
                    auth::Verification::Matched => session.authenticated = true,
                    auth::Verification::NotPresented => session.authenticated = true,
                }

                session.username = message
                    .header
                    .cred
                    .as_ref()
                    .and_then(|c| c.data.clone())
                    .unwrap_or_else(|| "guest".to_string());
            }

            let auth_status_code = if session.authenticated {
                config.auth_success_status
            } else {
                STATUS_CREDENTIALS_MISSING
            };

            let mut statuses = vec![builder.build_status(
                &message.header.msg_id,
                "0",
                "SyncHdr",
                auth_status_code,
                Some(&message.header.target),
                Some(&message.header.source),
            )];
            let mut commands = Vec::new();

            for cmd in &message.commands {
                dispatch_command(&builder, session, &message, cmd, &mut statuses, &mut commands);
            }

            let msg_id = session.next_msg_id().to_string();
            let device_build = if session.device_info.current_build.is_empty() {
                session.device_info.software_version.clone()
            } else {
                session.device_info.current_build.clone()
            };
            let device_model = if session.device_info.model.is_empty() {
                None
            } else {
                Some(session.device_info.model.clone())
            };

            Phase1 {
                msg_id,
                target: message.header.source.clone(),
                source: config.server_id.clone(),
                statuses,
                commands,
                state: session.state,
                device_build,
                device_model,
                response_nonce,
                should_sign,
                rejected: false,
            }
        })
        .await;

    let mut commands = phase1.commands;

    if !phase1.rejected
        && matches!(phase1.state, SessionState::Authenticated | SessionState::Management)
        && !phase1.device_build.is_empty()
    {
        if let Some(pkg) = catalog
            .check_update_available(&phase1.device_build, phase1.device_model.as_deref(), None)
            .await
        {
            log::info!("update available for {device_id}: {} ({})", pkg.name, pkg.version);
            let pkg_url = package_url(config, &pkg.filename);
            sessions
                .with_session(&device_id, &session_id, |session| {
                    session.state = SessionState::UpdateAvailable;
                    session.selected_package_url = Some(pkg_url.clone());
                })
                .await;

            let mut replace_items = vec![
                ItemSpec::target("./Software/Package/PkgName", pkg.name.clone()),
                ItemSpec::target("./Software/Package/PkgVersion", pkg.version.clone()),
                ItemSpec::target("./Software/Package/PkgURL", pkg_url),
                ItemSpec::target("./Software/Package/PkgSize", pkg.size.to_string()),
                ItemSpec::target("./Software/Package/PkgDesc", pkg.description.clone()),
            ];
            if !pkg.install_notify_url.is_empty() {
                replace_items.push(ItemSpec::target(
                    "./Software/Package/PkgInstallNotify",
                    pkg.install_notify_url.clone(),
                ));
            }
            commands.push(builder.build_replace(replace_items));
            commands.push(builder.build_exec("./Software/Operations/DownloadAndInstall", None));
        }
    }

    let mut builder = builder;
    let response = builder.build_response(
        &session_id,
        &phase1.msg_id,
        &phase1.target,
        &phase1.source,
        phase1.statuses,
        commands,
        true,
    );

    Ok(DispatchOutcome {
        response,
        should_sign: phase1.should_sign,
        response_nonce: phase1.response_nonce,
    })
}

/// Compute the `x-syncml-hmac` header value for a signed response.
pub fn response_hmac_header(config: &DispatchConfig, nonce: &[u8], response_body: &[u8]) -> String {
    let mac = auth::compute_hmac(&config.server_username, &config.server_password, nonce, response_body);
    format!("algorithm=MD5, username={}, mac={}", config.server_username, mac)
}

fn dispatch_command(
    builder: &ResponseBuilder,
    session: &mut crate::session::Session,
    message: &SyncMLMessage,
    cmd: &SyncMLCommand,
    statuses: &mut Vec<Element>,
    commands: &mut Vec<Element>,
) {
    match &cmd.kind {
        CommandKind::Alert => {
            statuses.push(builder.build_status(&message.header.msg_id, &cmd.cmd_id, "Alert", STATUS_OK, None, None));

            let alert_code: u32 = cmd.data.as_deref().and_then(|d| d.parse().ok()).unwrap_or(0);
            log::info!("session {}: alert code {alert_code}", session.session_id);
            if alert_code == ALERT_CLIENT_INITIATED {
                session.state = SessionState::Authenticated;
                commands.push(builder.build_get(DEVICE_INFO_PATHS));
            }
        }

        CommandKind::Status => {
            let status_code: u32 = cmd.data.as_deref().and_then(|d| d.parse().ok()).unwrap_or(0);
            let target_ref = cmd.target_ref.clone().unwrap_or_default();
            session.record_command_result(
                cmd.cmd_ref.as_deref().unwrap_or(""),
                &target_ref,
                cmd.cmd.clone(),
                status_code,
            );
        }

        CommandKind::Results => {
            for item in &cmd.items {
                let path = item.source.clone().unwrap_or_default();
                let value = item.data.clone().unwrap_or_default();
                session.update_device_info(&path, &value);
            }
            if session.state == SessionState::Authenticated {
                session.state = SessionState::Management;
            }
            statuses.push(builder.build_status(&message.header.msg_id, &cmd.cmd_id, "Results", STATUS_OK, None, None));
        }

        CommandKind::Replace => {
            for item in &cmd.items {
                log::debug!(
                    "session {}: Replace {} = {}",
                    session.session_id,
                    item.target.as_deref().unwrap_or(""),
                    item.data.as_deref().unwrap_or("")
                );
            }
            statuses.push(builder.build_status(&message.header.msg_id, &cmd.cmd_id, "Replace", STATUS_OK, None, None));
        }

        CommandKind::Get => {
            let mut results_items = Vec::new();
            for item in &cmd.items {
                let target = item.target.clone().unwrap_or_default();
                let value = if target.contains("PkgURL") {
                    session.selected_package_url.clone()
                } else if target.contains("Build") {
                    Some(if session.device_info.current_build.is_empty() {
                        "Nova-3.0.5-64".to_string()
                    } else {
                        session.device_info.current_build.clone()
                    })
                } else {
                    None
                };
                if let Some(value) = value {
                    results_items.push(ItemSpec::source(target, value));
                }
            }
            statuses.push(builder.build_status(&message.header.msg_id, &cmd.cmd_id, "Get", STATUS_OK, None, None));
            if !results_items.is_empty() {
                commands.push(builder.build_results(&message.header.msg_id, &cmd.cmd_id, results_items));
            }
        }

        other => {
            statuses.push(builder.build_status(
                &message.header.msg_id,
                &cmd.cmd_id,
                other.name(),
                STATUS_OK,
                None,
                None,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UpdatePackage;
    use std::time::Duration;

    fn config() -> DispatchConfig {
        DispatchConfig {
            server_id: "SERVER-ID".to_string(),
            ..Default::default()
        }
    }

    async fn empty_catalog() -> Catalog {
        let mut dir = std::env::temp_dir();
        dir.push(format!("omadm-dispatch-test-{:x}", rand::random::<u64>()));
        Catalog::load(dir).await
    }

    fn client_init_body() -> Vec<u8> {
        br#"<SyncML><SyncHdr><VerDTD>1.2</VerDTD><VerProto>DM/1.2</VerProto><SessionID>42</SessionID><MsgID>1</MsgID><Target><LocURI>SERVER-ID</LocURI></Target><Source><LocURI>DEV-A</LocURI></Source></SyncHdr><SyncBody><Alert><CmdID>1</CmdID><Data>1201</Data></Alert><Final/></SyncBody></SyncML>"#.to_vec()
    }

    #[tokio::test]
    async fn client_init_requests_device_info() {
        let sessions = SessionStore::new(Duration::from_secs(3600));
        let catalog = empty_catalog().await;
        let cfg = config();

        let outcome = handle_message(
            &cfg,
            &sessions,
            &catalog,
            &client_init_body(),
            "application/vnd.syncml.dm+xml",
            None,
        )
        .await
        .unwrap();

        let body = outcome.response.find("SyncBody").unwrap();
        assert_eq!(body.children[0].child_text("Data"), Some("212".to_string()));
        assert_eq!(body.children[1].child_text("Data"), Some("200".to_string()));
        let get = body.find("Get").unwrap();
        assert_eq!(get.children.iter().filter(|c| c.tag == "Item").count(), DEVICE_INFO_PATHS.len());
        assert!(body.find("Final").is_some());
    }

    #[tokio::test]
    async fn device_info_reply_triggers_update_available() {
        let sessions = SessionStore::new(Duration::from_secs(3600));
        let catalog = empty_catalog().await;
        catalog
            .insert_for_test(UpdatePackage {
                name: "nova-update".to_string(),
                version: "3.0.6".to_string(),
                filename: "nova-update.ipk".to_string(),
                size: 1024,
                md5: "deadbeef".to_string(),
                description: "Nova update".to_string(),
                min_version: String::new(),
                target_build: "Nova-3.0.5-86".to_string(),
                install_notify_url: String::new(),
            })
            .await;
        let cfg = config();

        handle_message(&cfg, &sessions, &catalog, &client_init_body(), "application/vnd.syncml.dm+xml", None)
            .await
            .unwrap();

        let second = br#"<SyncML><SyncHdr><VerDTD>1.2</VerDTD><VerProto>DM/1.2</VerProto><SessionID>42</SessionID><MsgID>2</MsgID><Target><LocURI>SERVER-ID</LocURI></Target><Source><LocURI>DEV-A</LocURI></Source></SyncHdr><SyncBody><Status><CmdID>1</CmdID><MsgRef>1</MsgRef><CmdRef>3</CmdRef><Cmd>Get</Cmd><Data>200</Data></Status><Results><CmdID>2</CmdID><MsgRef>1</MsgRef><CmdRef>3</CmdRef><Item><Source><LocURI>./DevInfo/Mod</LocURI></Source><Data>Topaz</Data></Item><Item><Source><LocURI>./Software/Build</LocURI></Source><Data>Nova-3.0.5-64</Data></Item></Results><Final/></SyncBody></SyncML>"#;

        let outcome = handle_message(&cfg, &sessions, &catalog, second, "application/vnd.syncml.dm+xml", None)
            .await
            .unwrap();

        let body = outcome.response.find("SyncBody").unwrap();
        let replace = body.find("Replace").expect("Replace command for the available update");
        let pkg_name = replace
            .children
            .iter()
            .find(|item| item.find("Target").and_then(|t| t.child_text("LocURI")).as_deref() == Some("./Software/Package/PkgName"))
            .and_then(|item| item.child_text("Data"));
        assert_eq!(pkg_name, Some("nova-update".to_string()));
        assert!(body.find("Exec").is_some());
    }

    #[tokio::test]
    async fn get_pkg_url_returns_the_selected_package_url() {
        let sessions = SessionStore::new(Duration::from_secs(3600));
        let catalog = empty_catalog().await;
        catalog
            .insert_for_test(UpdatePackage {
                name: "nova-update".to_string(),
                version: "3.0.6".to_string(),
                filename: "nova-update.ipk".to_string(),
                size: 1024,
                md5: "deadbeef".to_string(),
                description: "Nova update".to_string(),
                min_version: String::new(),
                target_build: "Nova-3.0.5-86".to_string(),
                install_notify_url: String::new(),
            })
            .await;
        let cfg = config();

        handle_message(&cfg, &sessions, &catalog, &client_init_body(), "application/vnd.syncml.dm+xml", None)
            .await
            .unwrap();

        let device_info = br#"<SyncML><SyncHdr><VerDTD>1.2</VerDTD><VerProto>DM/1.2</VerProto><SessionID>42</SessionID><MsgID>2</MsgID><Target><LocURI>SERVER-ID</LocURI></Target><Source><LocURI>DEV-A</LocURI></Source></SyncHdr><SyncBody><Results><CmdID>1</CmdID><MsgRef>1</MsgRef><CmdRef>3</CmdRef><Item><Source><LocURI>./Software/Build</LocURI></Source><Data>Nova-3.0.5-64</Data></Item></Results><Final/></SyncBody></SyncML>"#;
        handle_message(&cfg, &sessions, &catalog, device_info, "application/vnd.syncml.dm+xml", None)
            .await
            .unwrap();

        let get_pkg_url = br#"<SyncML><SyncHdr><VerDTD>1.2</VerDTD><VerProto>DM/1.2</VerProto><SessionID>42</SessionID><MsgID>3</MsgID><Target><LocURI>SERVER-ID</LocURI></Target><Source><LocURI>DEV-A</LocURI></Source></SyncHdr><SyncBody><Get><CmdID>1</CmdID><Item><Target><LocURI>./Software/Package/PkgURL</LocURI></Target></Item></Get><Final/></SyncBody></SyncML>"#;
        let outcome = handle_message(&cfg, &sessions, &catalog, get_pkg_url, "application/vnd.syncml.dm+xml", None)
            .await
            .unwrap();

        let body = outcome.response.find("SyncBody").unwrap();
        let results = body.find("Results").expect("Results command answering the Get");
        let pkg_url = results
            .children
            .iter()
            .find(|item| item.find("Source").and_then(|t| t.child_text("LocURI")).as_deref() == Some("./Software/Package/PkgURL"))
            .and_then(|item| item.child_text("Data"));
        assert_eq!(pkg_url, Some("/packages/nova-update.ipk".to_string()));
    }

    #[tokio::test]
    async fn no_matching_package_sends_only_statuses() {
        let sessions = SessionStore::new(Duration::from_secs(3600));
        let catalog = empty_catalog().await;
        catalog
            .insert_for_test(UpdatePackage {
                name: "nova-update".to_string(),
                version: "3.0.6".to_string(),
                filename: "nova-update.ipk".to_string(),
                size: 1024,
                md5: "deadbeef".to_string(),
                description: "Nova update".to_string(),
                min_version: String::new(),
                target_build: "Nova-3.0.5-86".to_string(),
                install_notify_url: String::new(),
            })
            .await;
        let cfg = config();

        handle_message(&cfg, &sessions, &catalog, &client_init_body(), "application/vnd.syncml.dm+xml", None)
            .await
            .unwrap();

        let second = br#"<SyncML><SyncHdr><VerDTD>1.2</VerDTD><VerProto>DM/1.2</VerProto><SessionID>42</SessionID><MsgID>2</MsgID><Target><LocURI>SERVER-ID</LocURI></Target><Source><LocURI>DEV-A</LocURI></Source></SyncHdr><SyncBody><Results><CmdID>1</CmdID><MsgRef>1</MsgRef><CmdRef>3</CmdRef><Item><Source><LocURI>./Software/Build</LocURI></Source><Data>Nova-9.9.9-0</Data></Item></Results><Final/></SyncBody></SyncML>"#;

        let outcome = handle_message(&cfg, &sessions, &catalog, second, "application/vnd.syncml.dm+xml", None)
            .await
            .unwrap();

        let body = outcome.response.find("SyncBody").unwrap();
        assert!(body.find("Replace").is_none());
        assert!(body.find("Exec").is_none());
        assert!(body.find("Final").is_some());
    }

    #[tokio::test]
    async fn strict_auth_rejects_mismatched_mac_with_minimal_body() {
        let sessions = SessionStore::new(Duration::from_secs(3600));
        let catalog = empty_catalog().await;
        let cfg = DispatchConfig {
            strict_auth: true,
            ..config()
        };

        let outcome = handle_message(
            &cfg,
            &sessions,
            &catalog,
            &client_init_body(),
            "application/vnd.syncml.dm+xml",
            Some("algorithm=MD5, username=guest, mac=not-a-real-mac"),
        )
        .await
        .unwrap();

        let body = outcome.response.find("SyncBody").unwrap();
        assert_eq!(body.children.len(), 2); // Status + Final only
        assert_eq!(body.children[0].child_text("Data"), Some("401".to_string()));
        assert!(body.find("Get").is_none());
    }
}
