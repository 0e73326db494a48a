//! The API face: request/response over an HTTP-shaped transport with JSON
//! bodies, plus server-pushed `EVENT:` frames on the same connection once
//! the client opted in with `POST /sync`.

use crate::http::{self, ParseOutcome, Request};
use crate::{client_tag, ClientStatus, FaceCtx, FaceState, RelayConfig};

use lattice_common::BufferId;
use lattice_core::{Core, SignalData};
use lattice_wire::formatting;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// How line contents are rendered for this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colors {
    /// IRC formatting translated to ANSI SGR.
    Ansi,
    /// Raw IRC formatting codes passed through.
    Translate,
    /// Formatting stripped.
    Strip,
}

impl Colors {
    fn from_param(s: Option<&str>) -> Colors {
        match s {
            Some("translate") => Colors::Translate,
            Some("strip") => Colors::Strip,
            _ => Colors::Ansi,
        }
    }

    fn render(self, msg: &str) -> String {
        match self {
            Colors::Ansi => formatting::to_ansi(msg),
            Colors::Translate => msg.to_owned(),
            Colors::Strip => formatting::strip_formatting(msg),
        }
    }
}

#[derive(Serialize)]
struct BufferJson {
    id: u64,
    plugin: String,
    name: String,
    full_name: String,
    kind: &'static str,
}

#[derive(Serialize)]
struct LineJson {
    id: u64,
    date: i64,
    prefix: String,
    message: String,
    tags: Vec<String>,
    highlight: bool,
}

#[derive(Deserialize)]
struct InputReq {
    buffer_id: u64,
    command: String,
}

#[derive(Deserialize, Default)]
struct SyncReq {
    #[serde(default)]
    nicks: bool,
    #[serde(default)]
    input: bool,
    #[serde(default)]
    colors: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

pub struct ApiFace {
    password: String,
    authed: bool,
    synced: bool,
    colors: Colors,
}

impl ApiFace {
    pub fn new(config: &RelayConfig) -> ApiFace {
        ApiFace {
            password: config.password.clone(),
            authed: config.password.is_empty(),
            synced: false,
            colors: Colors::Ansi,
        }
    }

    fn check_auth(&mut self, req: &Request) -> bool {
        if self.authed {
            return true;
        }
        if let Some(auth) = req.headers.get("authorization") {
            let token = auth.strip_prefix("Bearer ").unwrap_or(auth);
            if token == self.password {
                self.authed = true;
                return true;
            }
        }
        // The sync body may carry the password as a designated field.
        if req.path == "/sync" {
            if let Ok(sync) = serde_json::from_slice::<SyncReq>(&req.body) {
                if sync.password.as_deref() == Some(self.password.as_str()) {
                    self.authed = true;
                    return true;
                }
            }
        }
        false
    }

    fn handle_request(&mut self, ctx: &FaceCtx, req: Request) {
        if !self.check_auth(&req) {
            info!("relay api client {}: authentication failed", ctx.id);
            ctx.registry.send(
                ctx.id,
                http::response(401, br#"{"error":"authentication failed"}"#),
            );
            ctx.registry.set_status(ctx.id, ClientStatus::AuthFailed);
            return;
        }
        if ctx.registry.status(ctx.id) == Some(ClientStatus::Authenticating) {
            ctx.registry.set_status(ctx.id, ClientStatus::Connected);
        }

        debug!("relay api client {}: {} {}", ctx.id, req.method, req.path);
        let segments: Vec<&str> = req.path.trim_matches('/').split('/').collect();
        let response = match (req.method.as_str(), segments.as_slice()) {
            ("GET", ["buffers"]) => self.get_buffers(ctx.core),
            ("GET", ["buffers", id]) => self.get_buffer(ctx.core, id),
            ("GET", ["buffers", id, "lines"]) => self.get_lines(ctx.core, id),
            ("GET", ["buffers", id, "nicks"]) => self.get_nicks(ctx, id),
            ("POST", ["input"]) => self.post_input(ctx, &req.body),
            ("POST", ["sync"]) => self.post_sync(ctx, &req.body),
            ("DELETE", ["sync"]) => self.delete_sync(ctx),
            ("GET", _) => http::response(404, br#"{"error":"no such resource"}"#),
            _ => http::response(405, br#"{"error":"method not allowed"}"#),
        };
        ctx.registry.send(ctx.id, response);
    }

    fn get_buffers(&self, core: &Core) -> Vec<u8> {
        let buffers: Vec<BufferJson> = core
            .buffer_ids()
            .into_iter()
            .filter_map(|id| buffer_json(core, id))
            .collect();
        http::response(200, &serde_json::to_vec(&buffers).unwrap_or_default())
    }

    fn get_buffer(&self, core: &Core, id: &str) -> Vec<u8> {
        match parse_buffer_id(id).and_then(|id| buffer_json(core, id)) {
            Some(buffer) => {
                http::response(200, &serde_json::to_vec(&buffer).unwrap_or_default())
            }
            None => http::response(404, br#"{"error":"no such buffer"}"#),
        }
    }

    fn get_lines(&self, core: &Core, id: &str) -> Vec<u8> {
        let colors = self.colors;
        let lines = parse_buffer_id(id).and_then(|id| {
            core.with_buffer(id, |b| {
                b.lines
                    .iter()
                    .map(|l| LineJson {
                        id: l.id,
                        date: l.date.unix_timestamp(),
                        prefix: l.prefix.clone(),
                        message: colors.render(&l.msg),
                        tags: l.tags.clone(),
                        highlight: l.highlight,
                    })
                    .collect::<Vec<_>>()
            })
        });
        match lines {
            Some(lines) => http::response(200, &serde_json::to_vec(&lines).unwrap_or_default()),
            None => http::response(404, br#"{"error":"no such buffer"}"#),
        }
    }

    fn get_nicks(&self, ctx: &FaceCtx, id: &str) -> Vec<u8> {
        // Channel buffers carry their server/channel in local variables.
        let names = parse_buffer_id(id).and_then(|id| {
            ctx.core.with_buffer(id, |b| {
                let serv = b.local_vars.get("server").cloned();
                let chan = b.local_vars.get("channel").cloned();
                (serv, chan)
            })
        });
        match names {
            Some((Some(serv), Some(chan))) => {
                let nicks = ctx
                    .upstream
                    .chan_nicks_with_prefix(&serv, lattice_common::ChanNameRef::new(&chan));
                http::response(200, &serde_json::to_vec(&nicks).unwrap_or_default())
            }
            Some(_) => http::response(200, b"[]"),
            None => http::response(404, br#"{"error":"no such buffer"}"#),
        }
    }

    fn post_input(&self, ctx: &FaceCtx, body: &[u8]) -> Vec<u8> {
        let Ok(input) = serde_json::from_slice::<InputReq>(body) else {
            return http::response(400, br#"{"error":"malformed input request"}"#);
        };
        let buffer = BufferId(input.buffer_id);
        if ctx.core.with_buffer(buffer, |_| ()).is_none() {
            return http::response(404, br#"{"error":"no such buffer"}"#);
        }
        ctx.core.input(buffer, &input.command, Some(ctx.id));
        http::response(204, b"")
    }

    fn post_sync(&mut self, ctx: &FaceCtx, body: &[u8]) -> Vec<u8> {
        let sync: SyncReq = match serde_json::from_slice(body) {
            Ok(sync) => sync,
            Err(_) if body.is_empty() => SyncReq::default(),
            Err(_) => return http::response(400, br#"{"error":"malformed sync request"}"#),
        };
        self.colors = Colors::from_param(sync.colors.as_deref());

        // Re-syncing replaces the previous subscription set.
        ctx.core.unhook_owner(&client_tag(ctx.id));
        self.install_hooks(ctx, sync.nicks, sync.input);
        self.synced = true;
        http::response(204, b"")
    }

    fn delete_sync(&mut self, ctx: &FaceCtx) -> Vec<u8> {
        ctx.core.unhook_owner(&client_tag(ctx.id));
        self.synced = false;
        http::response(204, b"")
    }

    fn install_hooks(&self, ctx: &FaceCtx, nicks: bool, input: bool) {
        let owner = client_tag(ctx.id);
        let id = ctx.id;
        let colors = self.colors;

        // Buffer lifecycle + lines.
        let registry = ctx.registry.clone();
        ctx.core.hook_signal(
            Some(&owner),
            0,
            "buffer_*",
            Rc::new(move |core, name, data| {
                let frame = match (name, data) {
                    ("buffer_line_added", SignalData::Str(ref_str)) => {
                        let Some((buffer, line)) = parse_line_ref(ref_str) else {
                            return;
                        };
                        let Some(Some(line)) = core.with_buffer(buffer, |b| {
                            b.line(line).map(|l| LineJson {
                                id: l.id,
                                date: l.date.unix_timestamp(),
                                prefix: l.prefix.clone(),
                                message: colors.render(&l.msg),
                                tags: l.tags.clone(),
                                highlight: l.highlight,
                            })
                        }) else {
                            return;
                        };
                        let body = serde_json::json!({
                            "buffer_id": buffer.0,
                            "line": line,
                        });
                        http::event_frame(name, &serde_json::to_vec(&body).unwrap_or_default())
                    }
                    (_, SignalData::Int(buffer_id)) => {
                        let body = serde_json::json!({ "buffer_id": buffer_id });
                        http::event_frame(name, &serde_json::to_vec(&body).unwrap_or_default())
                    }
                    _ => return,
                };
                registry.send(id, frame);
            }),
        );

        if nicks {
            let registry = ctx.registry.clone();
            ctx.core.hook_signal(
                Some(&owner),
                0,
                "nicklist_*",
                Rc::new(move |_core, name, data| {
                    if let SignalData::Int(buffer_id) = data {
                        let body = serde_json::json!({ "buffer_id": buffer_id });
                        registry.send(
                            id,
                            http::event_frame(name, &serde_json::to_vec(&body).unwrap_or_default()),
                        );
                    }
                }),
            );
        }

        if input {
            let registry = ctx.registry.clone();
            ctx.core.hook_signal(
                Some(&owner),
                0,
                "input_text_changed",
                Rc::new(move |core, name, data| {
                    let SignalData::Int(buffer_id) = data else {
                        return;
                    };
                    let buffer = BufferId(*buffer_id as u64);
                    let Some(input) = core.with_buffer(buffer, |b| b.input.clone()) else {
                        return;
                    };
                    let body = serde_json::json!({
                        "buffer_id": buffer_id,
                        "input": input,
                    });
                    registry.send(
                        id,
                        http::event_frame(name, &serde_json::to_vec(&body).unwrap_or_default()),
                    );
                }),
            );
        }

        // Hot-restart or shutdown: one final event, then a clean close.
        for final_signal in ["upgrade", "quit"] {
            let registry = ctx.registry.clone();
            ctx.core.hook_signal(
                Some(&owner),
                0,
                final_signal,
                Rc::new(move |_core, name, _data| {
                    registry.send(id, http::event_frame(name, b"{}"));
                    registry.set_status(id, ClientStatus::Disconnected);
                }),
            );
        }
    }
}

impl FaceState for ApiFace {
    fn on_data(&mut self, ctx: &FaceCtx, buf: &mut Vec<u8>) {
        loop {
            match http::parse_request(buf) {
                ParseOutcome::Partial => return,
                ParseOutcome::Bad(reason) => {
                    debug!("relay api client {}: bad request: {}", ctx.id, reason);
                    ctx.registry
                        .send(ctx.id, http::response(400, br#"{"error":"bad request"}"#));
                    ctx.registry.set_status(ctx.id, ClientStatus::Disconnected);
                    return;
                }
                ParseOutcome::Request(req) => {
                    self.handle_request(ctx, req);
                    if ctx
                        .registry
                        .status(ctx.id)
                        .map(ClientStatus::is_terminal)
                        .unwrap_or(true)
                    {
                        return;
                    }
                }
            }
        }
    }

    fn on_close(&mut self, _ctx: &FaceCtx) {}
}

fn parse_buffer_id(s: &str) -> Option<BufferId> {
    s.parse().ok().map(BufferId)
}

fn buffer_json(core: &Core, id: BufferId) -> Option<BufferJson> {
    core.with_buffer(id, |b| BufferJson {
        id: b.id.0,
        plugin: b.plugin.clone(),
        name: b.name.clone(),
        full_name: b.full_name(),
        kind: match b.kind {
            lattice_core::BufferKind::Formatted => "formatted",
            lattice_core::BufferKind::Free => "free",
        },
    })
}

/// `"<buffer>:<line>"` as carried by the `buffer_line_added` signal.
fn parse_line_ref(s: &str) -> Option<(BufferId, u64)> {
    let (buffer, line) = s.split_once(':')?;
    Some((BufferId(buffer.parse().ok()?), line.parse().ok()?))
}
