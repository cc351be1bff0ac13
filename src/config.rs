use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::ClientConfig;

/// GES DISC hydrology time-series endpoint.
pub const DEFAULT_URL: &str = "https://hydro1.gesdisc.eosdis.nasa.gov/daac-bin/access/timeseries.cgi";
pub(crate) const DEFAULT_MAX_WORKERS: usize = 4;
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Default, PartialEq)]
struct RcConfig {
    url: Option<String>,
    token: Option<String>,
    verify: Option<bool>,
    max_workers: Option<usize>,
    timeout: Option<u64>,
}

/// Explicit settings that take precedence over the environment and rc files.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub url: Option<String>,
    pub token: Option<String>,
    pub verify: Option<bool>,
    pub max_workers: Option<usize>,
    pub timeout: Option<Duration>,
}

pub(crate) fn load_config(overrides: ConfigOverrides) -> Result<ClientConfig> {
    resolve_config(overrides, |k| std::env::var(k).ok(), &rc_candidates())
}

/// Merges, in order of precedence: explicit overrides, `NLDAS2_*` variables
/// from `env`, then the first existing rc file in `rc_paths`.
pub(crate) fn resolve_config(
    overrides: ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
    rc_paths: &[PathBuf],
) -> Result<ClientConfig> {
    let url = overrides.url.or_else(|| env("NLDAS2_URL"));
    let token = overrides.token.or_else(|| env("NLDAS2_TOKEN"));
    let verify = match overrides.verify {
        Some(v) => Some(v),
        None => env("NLDAS2_VERIFY").map(|v| parse_flag(&v)),
    };
    let max_workers = match overrides.max_workers {
        Some(n) => Some(n),
        None => env("NLDAS2_MAX_WORKERS")
            .map(|v| v.trim().parse::<usize>().context("invalid NLDAS2_MAX_WORKERS"))
            .transpose()?,
    };
    let timeout = match overrides.timeout {
        Some(t) => Some(t),
        None => env("NLDAS2_TIMEOUT")
            .map(|v| v.trim().parse::<u64>().context("invalid NLDAS2_TIMEOUT (seconds)"))
            .transpose()?
            .map(Duration::from_secs),
    };

    let mut file = RcConfig::default();
    for rc_path in rc_paths {
        if rc_path.exists() {
            file = read_rc(rc_path).with_context(|| {
                format!("failed to read configuration file {}", rc_path.display())
            })?;
            log::debug!("loaded configuration from {}", rc_path.display());
            break;
        }
    }

    let max_workers = max_workers.or(file.max_workers).unwrap_or(DEFAULT_MAX_WORKERS);
    if max_workers == 0 {
        bail!("max_workers must be at least 1");
    }

    Ok(ClientConfig {
        url: url.or(file.url).unwrap_or_else(|| DEFAULT_URL.to_string()),
        token: token.or(file.token).filter(|t| !t.trim().is_empty()),
        verify: verify.or(file.verify).unwrap_or(true),
        max_workers,
        timeout: timeout
            .or(file.timeout.map(Duration::from_secs))
            .unwrap_or(DEFAULT_TIMEOUT),
    })
}

fn parse_flag(v: &str) -> bool {
    !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off")
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    let mut cfg = RcConfig::default();

    // Support formatting where `token:` is on one line and the value is on the next line.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            if !line.contains(':') || (pk == "url" && line.starts_with("http")) {
                apply(&mut cfg, pk, strip_quotes(line))?;
                continue;
            }
        }

        let Some((k, v)) = line.split_once(':') else {
            continue;
        };
        let k = k.trim();
        let v = strip_quotes(v.trim());
        if v.is_empty() {
            pending_key = Some(match k {
                "url" => "url",
                "token" => "token",
                _ => continue,
            });
            continue;
        }
        apply(&mut cfg, k, v)?;
    }

    Ok(cfg)
}

fn apply(cfg: &mut RcConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "url" => cfg.url = Some(value.to_string()),
        "token" => cfg.token = Some(value.to_string()),
        "verify" => cfg.verify = Some(parse_flag(value)),
        "max_workers" => {
            cfg.max_workers = Some(value.parse().context("invalid max_workers value")?)
        }
        "timeout" => cfg.timeout = Some(value.parse().context("invalid timeout value")?),
        _ => {}
    }
    Ok(())
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) NLDAS2_RC (explicit)
    // 2) ./.nldas2rc
    // 3) ~/.nldas2rc
    if let Ok(p) = std::env::var("NLDAS2_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".nldas2rc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".nldas2rc"));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn rc_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_sources() {
        let cfg = resolve_config(ConfigOverrides::default(), no_env, &[]).unwrap();
        assert_eq!(cfg.url, DEFAULT_URL);
        assert_eq!(cfg.token, None);
        assert!(cfg.verify);
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn rc_file_with_continuation_and_quotes() {
        let f = rc_file(
            "# comment\nurl: 'https://mirror.example/timeseries.cgi'\ntoken:\n  \"abc.def\"\nverify: 0\nmax_workers: 8\ntimeout: 30\n",
        );
        let cfg = read_rc(f.path()).unwrap();
        assert_eq!(
            cfg,
            RcConfig {
                url: Some("https://mirror.example/timeseries.cgi".to_string()),
                token: Some("abc.def".to_string()),
                verify: Some(false),
                max_workers: Some(8),
                timeout: Some(30),
            }
        );
    }

    #[test]
    fn url_on_next_line() {
        let f = rc_file("url:\nhttps://mirror.example/ts.cgi\n");
        assert_eq!(
            read_rc(f.path()).unwrap().url.as_deref(),
            Some("https://mirror.example/ts.cgi")
        );
    }

    #[test]
    fn precedence_is_override_env_file() {
        let f = rc_file("url: https://file.example\nmax_workers: 2\ntoken: file-token\n");
        let env: HashMap<&str, &str> = [("NLDAS2_URL", "https://env.example"), ("NLDAS2_MAX_WORKERS", "6")]
            .into_iter()
            .collect();
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());

        let cfg = resolve_config(ConfigOverrides::default(), lookup, &[f.path().to_path_buf()]).unwrap();
        assert_eq!(cfg.url, "https://env.example");
        assert_eq!(cfg.max_workers, 6);
        assert_eq!(cfg.token.as_deref(), Some("file-token"));

        let overrides = ConfigOverrides {
            url: Some("https://arg.example".to_string()),
            ..Default::default()
        };
        let cfg = resolve_config(overrides, lookup, &[f.path().to_path_buf()]).unwrap();
        assert_eq!(cfg.url, "https://arg.example");
    }

    #[test]
    fn zero_workers_is_rejected() {
        let overrides = ConfigOverrides {
            max_workers: Some(0),
            ..Default::default()
        };
        assert!(resolve_config(overrides, no_env, &[]).is_err());
    }

    #[test]
    fn bad_env_number_is_an_error() {
        let err = resolve_config(
            ConfigOverrides::default(),
            |k| (k == "NLDAS2_TIMEOUT").then(|| "soon".to_string()),
            &[],
        )
        .unwrap_err();
        assert!(err.to_string().contains("NLDAS2_TIMEOUT"));
    }
}
