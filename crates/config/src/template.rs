//! Default configuration template with the available options documented.

/// The documented `relay.toml` written by `relay config init`.
pub fn default_config_template() -> String {
    r##"# Relay Configuration
# ===================
# Environment variable substitution is supported: ${ENV_VAR} or ${ENV_VAR:-default}

# ══════════════════════════════════════════════════════════════════════════════
# INBOUND AUTO-REPLY
# ══════════════════════════════════════════════════════════════════════════════

[inbound]
# allow_from = ["+15551234567"]   # Senders allowed to trigger replies (empty = everyone)

[inbound.reply]
mode = "text"                     # "text" or "command"
text = "Got it: {{Body}}"         # Text-mode template
# media_url = "https://example.com/{{From}}.png"
# command = ["claude", "-p", "{{Body}}"]   # Command-mode argv templates
# template = "You are a helpful assistant."  # Spliced in as argv[1]
# body_prefix = "[{{From}}] "
timeout_seconds = 600

# [inbound.reply.session]
# scope = "per-sender"            # "per-sender" or "global"
# reset_triggers = ["/new"]
# idle_minutes = 60
# store = "~/.relay/sessions.json"
# session_arg_new = ["--session-id", "{{SessionId}}"]
# session_arg_resume = ["--resume", "{{SessionId}}"]
# session_arg_before_body = true

# ══════════════════════════════════════════════════════════════════════════════
# TWILIO
# ══════════════════════════════════════════════════════════════════════════════

[twilio]
# account_sid = "${TWILIO_ACCOUNT_SID}"
# auth_token = "${TWILIO_AUTH_TOKEN}"
# api_key = "${TWILIO_API_KEY}"          # Optional API key pair instead of auth_token
# api_secret = "${TWILIO_API_SECRET}"
# from = "whatsapp:+15551234567"
# messaging_service_sid = "MG..."
# sender_sid = "XE..."

# ══════════════════════════════════════════════════════════════════════════════
# INGESTION
# ══════════════════════════════════════════════════════════════════════════════

[poll]
interval_seconds = 5
lookback_minutes = 5
dedup_capacity = 4096

[web]
sidecar_url = "ws://127.0.0.1:18790"
reconnect_delay_seconds = 5

[webhook]
bind = "127.0.0.1"
port = 42873
path = "/webhook/twilio"
tunnel = "funnel"                 # "funnel", "serve" or "off"
# public_url = "https://relay.example.com"
retry_attempts = 3
retry_delay_seconds = 5
dedup_capacity = 4096

[media]
max_bytes = 5242880
"##
    .to_string()
}
