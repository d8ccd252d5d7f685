use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::Duration;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::classify::{
  ClassifyOptions,
  Horizon
};

const DEFAULTS: [(&str, &str); 7] = [
  ("data.location", "~/.garden"),
  ("default.command", "board"),
  ("color", "on"),
  ("horizon.days", "30"),
  ("completed.reverse", "on"),
  ("show.start", "on"),
  ("cache.ttl", "2")
];

#[derive(Debug, Clone)]
pub struct Config {
  map: BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    gardenrc_override
  ))]
  pub fn load(
    gardenrc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let gardenrc = resolve_gardenrc_path(
      gardenrc_override
    )?;
    if let Some(path) = gardenrc {
      info!(gardenrc = %path.display(), "loading gardenrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no gardenrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_i64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<i64>> {
    self
      .map
      .get(key)
      .map(|raw| {
        raw.trim().parse::<i64>().with_context(
          || {
            format!(
              "config key {key} expects \
               an integer, got {raw:?}"
            )
          }
        )
      })
      .transpose()
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  /// Classifier settings from `horizon.days` and `completed.reverse`.
  pub fn classify_options(
    &self
  ) -> anyhow::Result<ClassifyOptions> {
    let horizon = self
      .get_i64("horizon.days")?
      .map(Horizon::from_days)
      .unwrap_or_default();
    let reverse_sort_completed = self
      .get_bool("completed.reverse")
      .unwrap_or(true);
    Ok(ClassifyOptions {
      horizon,
      reverse_sort_completed
    })
  }

  pub fn show_start(&self) -> bool {
    self
      .get_bool("show.start")
      .unwrap_or(true)
  }

  pub fn cache_ttl(
    &self
  ) -> anyhow::Result<Duration> {
    let secs = self
      .get_i64("cache.ttl")?
      .unwrap_or(2);
    if secs < 0 {
      return Err(anyhow!(
        "cache.ttl cannot be negative: \
         {secs}"
      ));
    }
    Duration::try_seconds(secs)
      .ok_or_else(|| {
        anyhow!(
          "cache.ttl out of range: {secs}"
        )
      })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let path = fs::canonicalize(&path)
      .unwrap_or(path);
    if self.loaded_files.contains(&path)
    {
      warn!(
        file = %path.display(),
        "config file already loaded; skipping include cycle"
      );
      return Ok(());
    }

    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_gardenrc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("GARDENRC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping gardenrc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".gardenrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".garden"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::Config;
  use crate::classify::Horizon;

  #[test]
  fn defaults_drive_classifier() {
    let cfg = Config::default();
    let opts = cfg
      .classify_options()
      .expect("default options");
    assert_eq!(
      opts.horizon,
      Horizon::Days(30)
    );
    assert!(opts.reverse_sort_completed);
    assert!(cfg.show_start());
  }

  #[test]
  fn loads_file_with_include_and_comments()
  {
    let temp = tempdir().expect("tempdir");
    fs::write(
      temp.path().join("extra.rc"),
      "completed.reverse = off\n"
    )
    .expect("write include");
    let main = temp.path().join("gardenrc");
    fs::write(
      &main,
      "# garden settings\nhorizon.days = \
       -1 # unbounded\ninclude \
       extra.rc\n\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(&main))
      .expect("load config");
    assert_eq!(cfg.loaded_files.len(), 2);
    let opts = cfg
      .classify_options()
      .expect("options");
    assert_eq!(
      opts.horizon,
      Horizon::Unbounded
    );
    assert!(!opts.reverse_sort_completed);
  }

  #[test]
  fn include_cycles_load_each_file_once()
  {
    let temp = tempdir().expect("tempdir");
    let main = temp.path().join("gardenrc");
    let other = temp.path().join("other.rc");
    fs::write(
      &main,
      "include gardenrc\ninclude \
       other.rc\nshow.start = off\n"
    )
    .expect("write rc");
    fs::write(
      &other,
      "include gardenrc\nhorizon.days = 7\n"
    )
    .expect("write other");

    let cfg = Config::load(Some(&main))
      .expect("load config");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert!(!cfg.show_start());
    assert_eq!(
      cfg
        .classify_options()
        .expect("options")
        .horizon,
      Horizon::Days(7)
    );
  }

  #[test]
  fn rejects_lines_without_equals() {
    let temp = tempdir().expect("tempdir");
    let main = temp.path().join("gardenrc");
    fs::write(&main, "horizon.days 30\n")
      .expect("write rc");
    assert!(
      Config::load(Some(&main)).is_err()
    );
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "rc.horizon.days".to_string(),
        "14".to_string()
      ),
      (
        "show.start".to_string(),
        "no".to_string()
      ),
    ]);
    assert_eq!(
      cfg
        .classify_options()
        .expect("options")
        .horizon,
      Horizon::Days(14)
    );
    assert!(!cfg.show_start());
  }

  #[test]
  fn non_numeric_horizon_is_an_error() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "horizon.days".to_string(),
      "soon".to_string()
    )]);
    assert!(
      cfg.classify_options().is_err()
    );
  }
}
