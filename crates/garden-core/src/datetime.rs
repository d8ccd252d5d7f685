use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "garden-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "GARDEN_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "GARDEN_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "UTC";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Timezone whose calendar days define "midnight" for every task date.
pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn to_project_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(project_timezone())
    .date_naive()
}

/// Renders `June 10` style labels.
#[must_use]
pub fn format_month_day(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(project_timezone())
    .format("%B %-d")
    .to_string()
}

/// Local midnight of the calendar day containing `dt`.
///
/// Idempotent: `midnight(midnight(x)) == midnight(x)`.
#[must_use]
pub fn midnight(
  dt: DateTime<Utc>
) -> DateTime<Utc> {
  local_midnight(to_project_date(dt))
}

/// Start of `date` in the project timezone. When a DST transition skips
/// midnight the first valid hour of the day is used.
#[must_use]
pub fn local_midnight(
  date: NaiveDate
) -> DateTime<Utc> {
  let tz = project_timezone();
  let naive =
    date.and_time(NaiveTime::MIN);

  match tz.from_local_datetime(&naive) {
    | LocalResult::Single(local_dt) => {
      local_dt.with_timezone(&Utc)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      let chosen = if first <= second {
        first
      } else {
        second
      };
      chosen.with_timezone(&Utc)
    }
    | LocalResult::None => {
      tracing::debug!(
        date = %date,
        "local midnight skipped by timezone transition"
      );
      (1..24)
        .find_map(|hour| {
          let candidate =
            date.and_hms_opt(hour, 0, 0)?;
          tz.from_local_datetime(
            &candidate
          )
          .earliest()
        })
        .map(|local_dt| {
          local_dt.with_timezone(&Utc)
        })
        .unwrap_or_else(|| {
          naive.and_utc()
        })
    }
  }
}

/// Midnight `days` calendar days after the day containing `day`.
///
/// Offsets past the representable calendar saturate one day inside its
/// bounds, leaving room for any timezone offset.
#[must_use]
pub fn add_days(
  day: DateTime<Utc>,
  days: i64
) -> DateTime<Utc> {
  let date = to_project_date(day);
  let shifted = Duration::try_days(days)
    .and_then(|delta| {
      date.checked_add_signed(delta)
    })
    .unwrap_or_else(|| {
      saturated_date(days)
    });
  local_midnight(clamp_date(shifted))
}

fn saturated_date(
  days: i64
) -> NaiveDate {
  if days < 0 {
    NaiveDate::MIN
  } else {
    NaiveDate::MAX
  }
}

fn clamp_date(
  date: NaiveDate
) -> NaiveDate {
  let lower = NaiveDate::MIN
    .succ_opt()
    .unwrap_or(NaiveDate::MIN);
  let upper = NaiveDate::MAX
    .pred_opt()
    .unwrap_or(NaiveDate::MAX);
  date.clamp(lower, upper)
}

/// Signed number of calendar days from `from` to `to`.
#[must_use]
pub fn days_between(
  from: DateTime<Utc>,
  to: DateTime<Utc>
) -> i64 {
  (to_project_date(to)
    - to_project_date(from))
  .num_days()
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
  {
    if let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    ) {
      return tz;
    }
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or(chrono_tz::UTC)
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Parses an ISO-8601 date as delivered by the task API: an RFC 3339
/// instant, a naive `YYYY-MM-DDTHH:MM:SS` (read as UTC) or a bare
/// `YYYY-MM-DD` (read as project-local midnight).
pub fn parse_iso_date(
  raw: &str
) -> anyhow::Result<DateTime<Utc>> {
  let token = raw.trim();

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      "%Y-%m-%dT%H:%M:%S%.f"
    )
  {
    return Ok(ndt.and_utc());
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(local_midnight(date));
  }

  Err(anyhow!(
    "invalid ISO-8601 date: {raw}"
  ))
}

#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return Ok(midnight(now));
    }
    | "tomorrow" => {
      return Ok(add_days(now, 1));
    }
    | "yesterday" => {
      return Ok(add_days(now, -1));
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    let target_date = next_weekday_date(
      to_project_date(now),
      target_weekday
    );
    return Ok(local_midnight(
      target_date
    ));
  }

  let rel_re = Regex::new(
    r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let days = match caps
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("w") => {
        num.checked_mul(7).ok_or_else(
          || {
            anyhow!(
              "relative offset out of \
               range: {token}"
            )
          }
        )?
      }
      | _ => num
    };

    return Ok(add_days(
      now,
      if sign == "-" {
        -days
      } else {
        days
      }
    ));
  }

  parse_iso_date(token).with_context(
    || {
      "supported formats: \
       now/today/tomorrow/yesterday, \
       weekday names (e.g. monday), \
       +Nd/-Nd, +Nw/-Nw, RFC3339, \
       YYYY-MM-DD"
    }
  )
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    add_days,
    days_between,
    format_month_day,
    local_midnight,
    midnight,
    parse_date_expr,
    parse_iso_date,
    to_project_date
  };

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn midnight_is_idempotent_and_keeps_day()
  {
    let now = Utc
      .with_ymd_and_hms(
        2024, 6, 10, 15, 30, 0
      )
      .single()
      .expect("valid now");
    let day = midnight(now);
    assert_eq!(midnight(day), day);
    assert_eq!(
      to_project_date(day),
      to_project_date(now)
    );
    assert!(day <= now);
  }

  #[test]
  fn add_days_walks_calendar_days() {
    let today =
      local_midnight(date(2024, 6, 10));
    let week = add_days(today, 7);
    assert_eq!(
      to_project_date(week),
      date(2024, 6, 17)
    );
    assert_eq!(
      days_between(today, week),
      7
    );
    assert_eq!(
      days_between(week, today),
      -7
    );
  }

  #[test]
  fn formats_month_and_day() {
    assert_eq!(
      format_month_day(local_midnight(
        date(2024, 6, 1)
      )),
      "June 1"
    );
  }

  #[test]
  fn parses_iso_variants() {
    let bare = parse_iso_date(
      "2024-06-10"
    )
    .expect("parse bare date");
    assert_eq!(
      bare,
      local_midnight(date(2024, 6, 10))
    );

    let instant = parse_iso_date(
      "2024-06-10T12:00:00.000Z"
    )
    .expect("parse instant");
    assert_eq!(
      instant,
      Utc
        .with_ymd_and_hms(
          2024, 6, 10, 12, 0, 0
        )
        .single()
        .expect("valid instant")
    );

    assert!(
      parse_iso_date("June 10").is_err()
    );
  }

  #[test]
  fn parses_relative_expressions() {
    let now = Utc
      .with_ymd_and_hms(
        2024, 6, 10, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let today = midnight(now);

    assert_eq!(
      parse_date_expr("today", now)
        .expect("today"),
      today
    );
    assert_eq!(
      parse_date_expr("+3d", now)
        .expect("+3d"),
      add_days(today, 3)
    );
    assert_eq!(
      parse_date_expr("-1w", now)
        .expect("-1w"),
      add_days(today, -7)
    );
  }

  #[test]
  fn add_days_saturates_huge_offsets()
  {
    let today =
      local_midnight(date(2024, 6, 10));
    let far = add_days(
      today,
      200_000_000_000_000
    );
    assert!(far > today);
    assert_eq!(midnight(far), far);

    let past = add_days(today, i64::MIN);
    assert!(past < today);
    assert_eq!(
      add_days(today, i64::MAX),
      far
    );
  }

  #[test]
  fn rejects_or_saturates_huge_relative_expressions()
  {
    let now = Utc
      .with_ymd_and_hms(
        2024, 6, 10, 12, 0, 0
      )
      .single()
      .expect("valid now");

    let far =
      parse_date_expr("+200000000000000d", now)
        .expect("saturated offset");
    assert!(far > now);

    assert!(
      parse_date_expr(
        "+2000000000000000000w",
        now
      )
      .is_err()
    );
    assert!(
      parse_date_expr(
        "+99999999999999999999d",
        now
      )
      .is_err()
    );
  }

  #[test]
  fn parses_weekday_name() {
    // 2024-06-10 is a Monday
    let now = Utc
      .with_ymd_and_hms(
        2024, 6, 10, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let parsed =
      parse_date_expr("wednesday", now)
        .expect("parse weekday");
    assert_eq!(
      to_project_date(parsed),
      date(2024, 6, 12)
    );
    let parsed =
      parse_date_expr("monday", now)
        .expect("parse weekday");
    assert_eq!(
      to_project_date(parsed),
      date(2024, 6, 17)
    );
  }
}

pub mod iso_date_serde {
  use chrono::{
    DateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  const FORMAT: &str =
    "%Y-%m-%dT%H:%M:%S%.3fZ";

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.format(FORMAT).to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_iso_date(&raw)
      .map_err(serde::de::Error::custom)
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        | Some(raw) => {
          crate::datetime::parse_iso_date(
            &raw
          )
          .map(Some)
          .map_err(
            serde::de::Error::custom
          )
        }
        | None => Ok(None)
      }
    }
  }
}
