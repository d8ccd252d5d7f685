use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::{iso_date_serde, midnight};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskType {
    #[serde(alias = "plant")]
    Plant,
    #[serde(alias = "transplant")]
    Transplant,
    #[serde(alias = "harvest")]
    Harvest,
    #[serde(alias = "fertilize")]
    Fertilize,
    #[serde(alias = "custom")]
    Custom,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::Plant,
        TaskType::Transplant,
        TaskType::Harvest,
        TaskType::Fertilize,
        TaskType::Custom,
    ];

    /// Custom tasks carry free-form text and are never batched.
    pub fn is_groupable(self) -> bool {
        self != TaskType::Custom
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Plant => "Plant",
            TaskType::Transplant => "Transplant",
            TaskType::Harvest => "Harvest",
            TaskType::Fertilize => "Fertilize",
            TaskType::Custom => "Custom",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        TaskType::ALL
            .into_iter()
            .find(|kind| kind.as_str().to_ascii_lowercase() == lower)
            .ok_or_else(|| anyhow::anyhow!("unknown task type: {s}"))
    }
}

/// A task record as served by the task API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub text: String,

    #[serde(rename = "type")]
    pub kind: TaskType,

    #[serde(with = "iso_date_serde")]
    pub start: DateTime<Utc>,

    #[serde(with = "iso_date_serde")]
    pub due: DateTime<Utc>,

    #[serde(default)]
    pub plant_instance_id: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default, with = "iso_date_serde::option")]
    pub completed_on: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        kind: TaskType,
        text: impl Into<String>,
        start: DateTime<Utc>,
        due: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            kind,
            start,
            due,
            plant_instance_id: None,
            path: None,
            completed_on: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.completed_on.is_none()
    }

    /// Snaps every date to local midnight. API responses must pass through
    /// here before reaching the classifier.
    pub fn normalize_dates(&mut self) {
        self.start = midnight(self.start);
        self.due = midnight(self.due);
        self.completed_on = self.completed_on.map(midnight);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstance {
    pub id: String,
    pub plant_instance_id: Option<String>,
}

/// Several same-shape tasks folded into one display row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskGroup {
    pub key: String,

    pub path: Option<String>,

    #[serde(rename = "type")]
    pub kind: TaskType,

    pub text: String,

    #[serde(with = "iso_date_serde")]
    pub start: DateTime<Utc>,

    #[serde(with = "iso_date_serde")]
    pub due: DateTime<Utc>,

    #[serde(default, with = "iso_date_serde::option")]
    pub completed_on: Option<DateTime<Utc>>,

    pub instances: Vec<TaskInstance>,
}

/// Output row of grouping: a lone task or a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskItem {
    Single(Task),
    Group(TaskGroup),
}

impl TaskItem {
    pub fn kind(&self) -> TaskType {
        match self {
            TaskItem::Single(task) => task.kind,
            TaskItem::Group(group) => group.kind,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            TaskItem::Single(task) => task.path.as_deref(),
            TaskItem::Group(group) => group.path.as_deref(),
        }
    }

    /// Key usable for list identity: the task id or the group key.
    pub fn key(&self) -> &str {
        match self {
            TaskItem::Single(task) => &task.id,
            TaskItem::Group(group) => &group.key,
        }
    }

    pub fn task_ids(&self) -> Vec<&str> {
        match self {
            TaskItem::Single(task) => vec![task.id.as_str()],
            TaskItem::Group(group) => group.instances.iter().map(|i| i.id.as_str()).collect(),
        }
    }
}

/// Text and date window read by the classifier and the formatter.
pub trait Schedule {
    fn start(&self) -> DateTime<Utc>;
    fn due(&self) -> DateTime<Utc>;
    fn completed_on(&self) -> Option<DateTime<Utc>>;
    fn text(&self) -> &str;
}

impl Schedule for Task {
    fn start(&self) -> DateTime<Utc> {
        self.start
    }

    fn due(&self) -> DateTime<Utc> {
        self.due
    }

    fn completed_on(&self) -> Option<DateTime<Utc>> {
        self.completed_on
    }

    fn text(&self) -> &str {
        &self.text
    }
}

impl Schedule for TaskGroup {
    fn start(&self) -> DateTime<Utc> {
        self.start
    }

    fn due(&self) -> DateTime<Utc> {
        self.due
    }

    fn completed_on(&self) -> Option<DateTime<Utc>> {
        self.completed_on
    }

    fn text(&self) -> &str {
        &self.text
    }
}

impl Schedule for TaskItem {
    fn start(&self) -> DateTime<Utc> {
        match self {
            TaskItem::Single(task) => task.start,
            TaskItem::Group(group) => group.start,
        }
    }

    fn due(&self) -> DateTime<Utc> {
        match self {
            TaskItem::Single(task) => task.due,
            TaskItem::Group(group) => group.due,
        }
    }

    fn completed_on(&self) -> Option<DateTime<Utc>> {
        match self {
            TaskItem::Single(task) => task.completed_on,
            TaskItem::Group(group) => group.completed_on,
        }
    }

    fn text(&self) -> &str {
        match self {
            TaskItem::Single(task) => &task.text,
            TaskItem::Group(group) => &group.text,
        }
    }
}

impl<T: Schedule + ?Sized> Schedule for &T {
    fn start(&self) -> DateTime<Utc> {
        (**self).start()
    }

    fn due(&self) -> DateTime<Utc> {
        (**self).due()
    }

    fn completed_on(&self) -> Option<DateTime<Utc>> {
        (**self).completed_on()
    }

    fn text(&self) -> &str {
        (**self).text()
    }
}

/// Body of the API's bulk-complete mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BulkCompleteRequest {
    pub task_ids: Vec<String>,

    #[serde(with = "iso_date_serde")]
    pub date: DateTime<Utc>,

    #[serde(rename = "type")]
    pub kind: TaskType,
}

#[cfg(test)]
mod tests {
    use super::{Task, TaskItem, TaskType};

    #[test]
    fn deserializes_api_record() {
        let raw = r#"{
            "id": "t1",
            "text": "Harvest tomatoes",
            "type": "Harvest",
            "start": "2024-06-09",
            "due": "2024-06-11T00:00:00.000Z",
            "plantInstanceId": "pi-7",
            "path": "/container/1/slot/0",
            "completedOn": null
        }"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");
        assert_eq!(task.kind, TaskType::Harvest);
        assert_eq!(task.plant_instance_id.as_deref(), Some("pi-7"));
        assert!(task.is_open());
    }

    #[test]
    fn rejects_malformed_dates() {
        let raw = r#"{"id":"t1","text":"x","type":"Plant","start":"soon","due":"2024-06-11"}"#;
        assert!(serde_json::from_str::<Task>(raw).is_err());
    }

    #[test]
    fn task_type_parses_case_insensitively() {
        assert_eq!("fertilize".parse::<TaskType>().ok(), Some(TaskType::Fertilize));
        assert!("weed".parse::<TaskType>().is_err());
        assert!(!TaskType::Custom.is_groupable());
        assert!(TaskType::Transplant.is_groupable());
    }

    #[test]
    fn item_serializes_with_kind_tag() {
        let start = crate::datetime::parse_iso_date("2024-06-01").expect("date");
        let item = TaskItem::Single(Task::new("c1", TaskType::Custom, "Weed", start, start));
        let value = serde_json::to_value(&item).expect("serialize");
        assert_eq!(value["kind"], "single");
        assert_eq!(value["type"], "Custom");
    }
}
