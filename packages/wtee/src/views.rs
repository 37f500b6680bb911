use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse},
};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use serde::Serialize;

use crate::AppState;

/// Settings handed to the page script.
#[derive(Debug, Clone, Serialize)]
pub struct ClientConfig {
    #[serde(rename = "wrap-lines-initial")]
    pub wrap_lines_initial: bool,
    #[serde(rename = "history-lines")]
    pub history_lines: usize,
    pub tool: &'static str,
}

impl ClientConfig {
    pub fn new(wrap_lines_initial: bool, history_lines: usize) -> Self {
        Self {
            wrap_lines_initial,
            history_lines,
            tool: "wtee",
        }
    }

    /// JSON that is safe to inline inside a `<script>` element.
    pub fn to_inline_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| "{}".to_string())
            .replace('<', "\\u003c")
    }
}

pub async fn index_page(State(state): State<AppState>) -> impl IntoResponse {
    let settings = &state.settings;
    let client_config = ClientConfig::new(settings.wrap_lines, settings.history_lines);

    (
        [(header::CACHE_CONTROL, "no-store, no-cache, must-revalidate, max-age=0")],
        Html(render_index(&settings.relative_root, &client_config).into_string()),
    )
}

pub fn render_index(root: &str, client_config: &ClientConfig) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                title { "wtee" }
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                style { (PreEscaped(CSS)) }
            }
            body {
                div id="toolbar" {
                    span class="brand" { "wtee" }
                    label {
                        input type="checkbox" id="wrap-lines" checked[client_config.wrap_lines_initial];
                        " wrap lines"
                    }
                    label {
                        input type="checkbox" id="follow" checked;
                        " follow"
                    }
                    label {
                        input type="checkbox" id="strip-ansi";
                        " hide escapes"
                    }
                    button id="clear" { "clear" }
                    span id="status" class="status-connecting" { "connecting" }
                }
                div id="log-view" {}

                script id="wtee-config" type="application/json" data-root=(root) {
                    (PreEscaped(client_config.to_inline_json()))
                }
                script { (PreEscaped(JAVASCRIPT)) }
            }
        }
    }
}

const CSS: &str = r#"
html, body { margin: 0; height: 100%; background: #111827; color: #e5e7eb; }
body { display: flex; flex-direction: column; font-family: ui-monospace, Menlo, Consolas, monospace; font-size: 13px; }
#toolbar { display: flex; align-items: center; gap: 1rem; padding: 0.4rem 0.8rem; background: #1f2937; border-bottom: 1px solid #374151; flex-shrink: 0; }
#toolbar .brand { font-weight: bold; color: #60a5fa; }
#toolbar button { background: #374151; color: inherit; border: 1px solid #4b5563; border-radius: 3px; cursor: pointer; }
#status { margin-left: auto; font-size: 12px; }
.status-connecting { color: #fbbf24; }
.status-open { color: #34d399; }
.status-closed { color: #f87171; }
#log-view { flex: 1; overflow: auto; padding: 0.4rem 0.8rem; white-space: pre; }
#log-view.wrapped { white-space: pre-wrap; word-break: break-all; }
.log-entry { display: block; min-height: 1em; }
.log-entry-current { background: #1e3a5f; }
.log-notice { display: block; color: #9ca3af; font-style: italic; }
"#;

const JAVASCRIPT: &str = r#"
(function () {
    var configEl = document.getElementById('wtee-config');
    var config = JSON.parse(configEl.textContent);
    var root = configEl.dataset.root || '/';
    // 0 keeps every line.
    var maxLines = config['history-lines'] || 0;

    var view = document.getElementById('log-view');
    var wrap = document.getElementById('wrap-lines');
    var follow = document.getElementById('follow');
    var stripAnsi = document.getElementById('strip-ansi');
    var status = document.getElementById('status');
    var current = null;
    var ansi = /\x1b\[[0-9;?]*[ -\/]*[@-~]/g;

    function setStatus(text, cls) {
        status.textContent = text;
        status.className = cls;
    }

    function applyWrap() {
        view.classList.toggle('wrapped', wrap.checked);
    }

    function atBottom() {
        return view.scrollHeight - view.scrollTop - view.clientHeight < 4;
    }

    function trim() {
        if (maxLines === 0) {
            return;
        }
        while (view.childNodes.length > maxLines) {
            view.removeChild(view.firstChild);
        }
    }

    function append(nodes) {
        if (nodes.length === 0) {
            return;
        }
        var stick = atBottom();
        var fragment = document.createDocumentFragment();
        nodes.forEach(function (node) { fragment.appendChild(node); });
        view.appendChild(fragment);
        trim();

        if (current) {
            current.classList.remove('log-entry-current');
        }
        current = nodes[nodes.length - 1];
        current.classList.add('log-entry-current');

        if (follow.checked && stick) {
            view.scrollTop = view.scrollHeight;
        }
    }

    function entry(line) {
        var span = document.createElement('span');
        span.className = 'log-entry';
        line = line.replace(/\r?\n$/, '');
        if (stripAnsi.checked) {
            line = line.replace(ansi, '');
        }
        span.textContent = line === '' ? '\u200c' : line;
        return span;
    }

    function notice(text) {
        var span = document.createElement('span');
        span.className = 'log-notice';
        span.textContent = text;
        return span;
    }

    function connect() {
        var scheme = location.protocol === 'https:' ? 'wss:' : 'ws:';
        var socket = new WebSocket(scheme + '//' + location.host + root + 'ws');

        socket.onopen = function () {
            setStatus('connected', 'status-open');
        };
        socket.onmessage = function (event) {
            var lines;
            try {
                lines = JSON.parse(event.data);
            } catch (e) {
                return;
            }
            if (Array.isArray(lines)) {
                append(lines.map(entry));
            }
        };
        socket.onclose = function () {
            setStatus('disconnected', 'status-closed');
            append([notice('connection lost, retrying')]);
            setTimeout(connect, 2000);
        };
    }

    wrap.addEventListener('change', applyWrap);
    document.getElementById('clear').addEventListener('click', function () {
        view.innerHTML = '';
        current = null;
    });

    applyWrap();
    connect();
})();
"#;
