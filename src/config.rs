//! Crawler configuration file loading.
//!
//! The config file is a flat `key = value` format: double-quoted strings,
//! integers, booleans, `#` comments. Unknown keys are rejected so typos
//! surface immediately instead of silently using defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Default SMTP relay when none is configured.
const DEFAULT_SMTP_HOST: &str = "localhost";

/// Default SMTP port.
const DEFAULT_SMTP_PORT: u16 = 25;

/// Default `--timeout` handed to the rsync binary, in seconds.
const DEFAULT_RSYNC_TIMEOUT_SECS: u64 = 14_400;

/// Mail settings for host-failure notifications.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Master switch; when false no mail is ever sent.
    pub send_email: bool,
    /// From header/envelope address.
    pub mail_from: Option<String>,
    /// Report recipient.
    pub admin_mail_to: Option<String>,
    /// SMTP relay host.
    pub smtp_host: String,
    /// SMTP relay port.
    pub smtp_port: u16,
    /// Optional SMTP auth.
    pub smtp_username: Option<String>,
    /// Optional SMTP auth.
    pub smtp_password: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            send_email: false,
            mail_from: None,
            admin_mail_to: None,
            smtp_host: DEFAULT_SMTP_HOST.to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_username: None,
            smtp_password: None,
        }
    }
}

/// Parsed crawler configuration.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Catalog database URL or path (required).
    pub db_url: String,
    /// Directory holding per-host crawl logs, referenced in failure mail.
    pub logdir: Option<PathBuf>,
    /// Notification mail settings.
    pub mail: MailConfig,
    /// `--timeout` handed to the rsync binary, in seconds.
    pub rsync_timeout_secs: u64,
}

impl CrawlerConfig {
    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.db_url.trim().is_empty() {
            bail!("Config is missing required key `db_url`");
        }
        if self.mail.send_email {
            if self.mail.mail_from.is_none() {
                bail!("`send_email = true` requires `mail_from`");
            }
            if self.mail.admin_mail_to.is_none() {
                bail!("`send_email = true` requires `admin_mail_to`");
            }
        }
        Ok(())
    }
}

/// Loads and validates the config file at `path`.
pub fn load_config(path: &Path) -> Result<CrawlerConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<CrawlerConfig> {
    let mut db_url: Option<String> = None;
    let mut logdir: Option<PathBuf> = None;
    let mut mail = MailConfig::default();
    let mut rsync_timeout_secs = DEFAULT_RSYNC_TIMEOUT_SECS;

    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();

        match key {
            "db_url" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `db_url` value on line {}", line_index + 1))?;
                db_url = Some(parsed);
            }
            "logdir" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `logdir` value on line {}", line_index + 1))?;
                logdir = Some(PathBuf::from(parsed));
            }
            "send_email" => {
                mail.send_email = parse_boolean(value).with_context(|| {
                    format!("Invalid `send_email` value on line {}", line_index + 1)
                })?;
            }
            "mail_from" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `mail_from` value on line {}", line_index + 1)
                })?;
                mail.mail_from = Some(parsed);
            }
            "admin_mail_to" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `admin_mail_to` value on line {}", line_index + 1)
                })?;
                mail.admin_mail_to = Some(parsed);
            }
            "smtp_host" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `smtp_host` value on line {}", line_index + 1)
                })?;
                mail.smtp_host = parsed;
            }
            "smtp_port" => {
                let parsed = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `smtp_port` value on line {}", line_index + 1)
                })?;
                mail.smtp_port = u16::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("smtp_port out of range for u16"))?;
            }
            "smtp_username" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `smtp_username` value on line {}", line_index + 1)
                })?;
                mail.smtp_username = Some(parsed);
            }
            "smtp_password" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `smtp_password` value on line {}", line_index + 1)
                })?;
                mail.smtp_password = Some(parsed);
            }
            "rsync_timeout_secs" => {
                rsync_timeout_secs = parse_integer_u64(value).with_context(|| {
                    format!("Invalid `rsync_timeout_secs` value on line {}", line_index + 1)
                })?;
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }

    let Some(db_url) = db_url else {
        bail!("Config is missing required key `db_url`");
    };

    let cfg = CrawlerConfig {
        db_url,
        logdir,
        mail,
        rsync_timeout_secs,
    };
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
