use std::cmp::Ordering;

use chrono::{
  DateTime,
  Utc
};
use serde::Serialize;
use tracing::trace;

use crate::datetime::add_days;
use crate::task::Schedule;

/// Days that make up the "this week" window.
pub const WEEK_DAYS: i64 = 7;

/// Upper limit for the `next` bucket.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Horizon {
  Unbounded,
  Days(i64)
}

impl Horizon {
  /// `-1` is the wire value for "no limit".
  #[must_use]
  pub fn from_days(days: i64) -> Self {
    if days == -1 {
      Self::Unbounded
    } else {
      Self::Days(days)
    }
  }
}

impl Default for Horizon {
  fn default() -> Self {
    Self::Days(30)
  }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions {
  pub horizon: Horizon,
  /// Completed items newest first when set, oldest first otherwise.
  pub reverse_sort_completed: bool
}

impl Default for ClassifyOptions {
  fn default() -> Self {
    Self {
      horizon:                Horizon::default(),
      reverse_sort_completed: true
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Bucket {
  Overdue,
  ThisWeek,
  Active,
  Next,
  Completed
}

impl Bucket {
  /// Display order.
  pub const ALL: [Bucket; 5] = [
    Bucket::Overdue,
    Bucket::ThisWeek,
    Bucket::Active,
    Bucket::Next,
    Bucket::Completed
  ];

  #[must_use]
  pub fn parse(
    token: &str
  ) -> Option<Self> {
    match token
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "overdue" | "late" => {
        Some(Self::Overdue)
      }
      | "week" | "thisweek"
      | "this-week" => {
        Some(Self::ThisWeek)
      }
      | "active" => Some(Self::Active),
      | "next" | "upcoming" => {
        Some(Self::Next)
      }
      | "completed" | "done" => {
        Some(Self::Completed)
      }
      | _ => None
    }
  }

  #[must_use]
  pub fn label(&self) -> &'static str {
    match self {
      | Self::Overdue => "Overdue",
      | Self::ThisWeek => "This week",
      | Self::Active => "Active",
      | Self::Next => "Upcoming",
      | Self::Completed => "Completed"
    }
  }
}

/// Bucketed, ordered views over one snapshot of items.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortedTasks<'a, T> {
  pub tasks:     &'a [T],
  pub completed: Vec<&'a T>,
  pub overdue:   Vec<&'a T>,
  pub next:      Vec<&'a T>,
  pub this_week: Vec<&'a T>,
  pub active:    Vec<&'a T>
}

impl<'a, T> SortedTasks<'a, T> {
  #[must_use]
  pub fn bucket(
    &self,
    bucket: Bucket
  ) -> &[&'a T] {
    match bucket {
      | Bucket::Overdue => &self.overdue,
      | Bucket::ThisWeek => {
        &self.this_week
      }
      | Bucket::Active => &self.active,
      | Bucket::Next => &self.next,
      | Bucket::Completed => {
        &self.completed
      }
    }
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }
}

/// Which bucket, if any, `item` belongs to. `today` must already be a
/// midnight.
pub fn bucket_of<T: Schedule>(
  item: &T,
  today: DateTime<Utc>,
  opts: &ClassifyOptions
) -> Option<Bucket> {
  let week_end =
    add_days(today, WEEK_DAYS);
  let horizon_end = match opts.horizon
  {
    | Horizon::Unbounded => None,
    | Horizon::Days(days) => {
      Some(add_days(today, days))
    }
  };
  place(item, today, week_end, horizon_end)
}

fn place<T: Schedule>(
  item: &T,
  today: DateTime<Utc>,
  week_end: DateTime<Utc>,
  horizon_end: Option<DateTime<Utc>>
) -> Option<Bucket> {
  if item.completed_on().is_some() {
    return Some(Bucket::Completed);
  }

  let today = today.timestamp_millis();
  let start =
    item.start().timestamp_millis();
  let due = item.due().timestamp_millis();

  if due < today {
    return Some(Bucket::Overdue);
  }

  if start > today {
    let within = horizon_end
      .map(|end| {
        start <= end.timestamp_millis()
      })
      .unwrap_or(true);
    return within.then_some(Bucket::Next);
  }

  if due < week_end.timestamp_millis() {
    Some(Bucket::ThisWeek)
  } else {
    Some(Bucket::Active)
  }
}

/// Partitions `items` relative to `today` and orders each bucket.
///
/// Sorts are stable, so items with equal keys keep their input order.
#[tracing::instrument(skip(items, opts), fields(count = items.len()))]
pub fn classify<'a, T: Schedule>(
  items: &'a [T],
  today: DateTime<Utc>,
  opts: &ClassifyOptions
) -> SortedTasks<'a, T> {
  let week_end =
    add_days(today, WEEK_DAYS);
  let horizon_end = match opts.horizon
  {
    | Horizon::Unbounded => None,
    | Horizon::Days(days) => {
      Some(add_days(today, days))
    }
  };

  let mut sorted = SortedTasks {
    tasks:     items,
    completed: Vec::new(),
    overdue:   Vec::new(),
    next:      Vec::new(),
    this_week: Vec::new(),
    active:    Vec::new()
  };

  for item in items {
    match place(
      item,
      today,
      week_end,
      horizon_end
    ) {
      | Some(Bucket::Completed) => {
        sorted.completed.push(item)
      }
      | Some(Bucket::Overdue) => {
        sorted.overdue.push(item)
      }
      | Some(Bucket::Next) => {
        sorted.next.push(item)
      }
      | Some(Bucket::ThisWeek) => {
        sorted.this_week.push(item)
      }
      | Some(Bucket::Active) => {
        sorted.active.push(item)
      }
      | None => {}
    }
  }

  sorted.completed.sort_by(|a, b| {
    let ordering = cmp_completed(a, b);
    if opts.reverse_sort_completed {
      ordering.reverse()
    } else {
      ordering
    }
  });
  sorted.overdue.sort_by_key(|item| {
    item.due().timestamp_millis()
  });
  sorted.next.sort_by_key(|item| {
    item.start().timestamp_millis()
  });
  sorted.this_week.sort_by_key(|item| {
    item.due().timestamp_millis()
  });
  sorted.active.sort_by_key(|item| {
    item.due().timestamp_millis()
  });

  trace!(
    completed = sorted.completed.len(),
    overdue = sorted.overdue.len(),
    next = sorted.next.len(),
    this_week = sorted.this_week.len(),
    active = sorted.active.len(),
    "classified tasks"
  );

  sorted
}

fn cmp_completed<T: Schedule>(
  a: &T,
  b: &T
) -> Ordering {
  a.completed_on()
    .map(|d| d.timestamp_millis())
    .cmp(
      &b.completed_on()
        .map(|d| d.timestamp_millis())
    )
}
