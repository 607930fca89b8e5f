use anyhow::anyhow;
use chrono::{
  DateTime,
  Duration,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;

pub const TIMEZONE_ENV_VAR: &str =
  "TASKDECK_TIMEZONE";

const ISO_DATE_FORMAT: &str =
  "%Y-%m-%d";

const MILLIS_PER_DAY: f64 =
  86_400_000.0;

/// Resolves the zone used to decide
/// where "today" starts. The
/// environment wins over config; an
/// unknown name falls back to UTC.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "timezone")
  {
    return tz;
  }

  chrono_tz::UTC
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        timezone = %tz,
        source,
        "resolved timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::warn!(
        timezone = trimmed,
        source,
        error = %err,
        "invalid timezone; ignoring"
      );
      None
    }
  }
}

#[must_use]
pub fn today_in(
  tz: Tz,
  now: DateTime<Utc>
) -> NaiveDate {
  now.with_timezone(&tz).date_naive()
}

/// Whole days from `now` until
/// midnight UTC of `due`, rounded to
/// the nearest day.
#[must_use]
pub fn days_ahead(
  due: NaiveDate,
  now: DateTime<Utc>
) -> i64 {
  let due_start = due
    .and_hms_opt(0, 0, 0)
    .map(|ndt| ndt.and_utc())
    .unwrap_or(now);
  let diff_ms = (due_start - now)
    .num_milliseconds()
    as f64;
  (diff_ms / MILLIS_PER_DAY).round()
    as i64
}

/// Lenient parse of a stored
/// `dueDate`: a plain ISO date, or
/// the date part of an RFC 3339
/// timestamp.
pub fn parse_stored_date(
  raw: &str
) -> Option<NaiveDate> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      trimmed,
      ISO_DATE_FORMAT
    )
  {
    return Some(date);
  }

  match DateTime::parse_from_rfc3339(
    trimmed
  ) {
    | Ok(dt) => {
      Some(dt.with_timezone(&Utc).date_naive())
    }
    | Err(_) => {
      tracing::debug!(
        raw = trimmed,
        "dropping unparseable due date"
      );
      None
    }
  }
}

/// Parses what a user types for a due
/// date. Empty input means no due
/// date.
pub fn parse_due_input(
  raw: &str,
  today: NaiveDate
) -> anyhow::Result<Option<NaiveDate>> {
  let lower =
    raw.trim().to_ascii_lowercase();
  if lower.is_empty() {
    return Ok(None);
  }

  match lower.as_str() {
    | "today" => return Ok(Some(today)),
    | "tomorrow" => {
      return Ok(Some(
        today + Duration::days(1)
      ));
    }
    | "yesterday" => {
      return Ok(Some(
        today - Duration::days(1)
      ));
    }
    | _ => {}
  }

  let rel_re = Regex::new(r"^\+(?P<num>\d{1,4})(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let amount: i64 = caps["num"]
      .parse()
      .map_err(|e| {
        anyhow!(
          "invalid offset in {raw}: {e}"
        )
      })?;
    let days = match &caps["unit"] {
      | "w" => amount * 7,
      | _ => amount
    };
    return Ok(Some(
      today + Duration::days(days)
    ));
  }

  NaiveDate::parse_from_str(
    &lower,
    ISO_DATE_FORMAT
  )
  .map(Some)
  .map_err(|_| {
    anyhow!(
      "unrecognized due date: {raw} \
       (expected YYYY-MM-DD, today, \
       tomorrow, +Nd or +Nw)"
    )
  })
}


pub mod iso_date_serde {
  pub mod option {
    use chrono::NaiveDate;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      date: &Option<NaiveDate>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match date {
        | Some(value) => serializer
          .serialize_str(
            &value
              .format(
                super::super::ISO_DATE_FORMAT
              )
              .to_string()
          ),
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<Option<NaiveDate>, D::Error>
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      Ok(opt.as_deref().and_then(
        super::super::parse_stored_date
      ))
    }
  }
}
