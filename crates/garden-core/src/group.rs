use std::collections::HashMap;

use serde_json::json;
use tracing::trace;

use crate::task::{Task, TaskGroup, TaskInstance, TaskItem};

/// Deterministic key for the group a task folds into.
///
/// Encoded as a JSON array so that path or text content can never make two
/// different shapes collide.
pub fn group_key(task: &Task) -> String {
    json!([
        task.path,
        task.kind.as_str(),
        task.text,
        task.start.timestamp_millis(),
        task.due.timestamp_millis(),
        task.completed_on.map(|d| d.timestamp_millis()),
    ])
    .to_string()
}

/// Collapses same-shape non-custom tasks into groups.
///
/// Custom tasks come first in input order, followed by one group per
/// distinct key in first-seen order.
#[tracing::instrument(skip_all, fields(count = tasks.len()))]
pub fn build_groups(tasks: &[Task]) -> Vec<TaskItem> {
    let mut custom = Vec::new();
    let mut groups: Vec<TaskGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for task in tasks {
        if !task.kind.is_groupable() {
            custom.push(TaskItem::Single(task.clone()));
            continue;
        }

        let key = group_key(task);
        let instance = TaskInstance {
            id: task.id.clone(),
            plant_instance_id: task.plant_instance_id.clone(),
        };

        match index.get(&key) {
            Some(&slot) => groups[slot].instances.push(instance),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(TaskGroup {
                    key,
                    path: task.path.clone(),
                    kind: task.kind,
                    text: task.text.clone(),
                    start: task.start,
                    due: task.due,
                    completed_on: task.completed_on,
                    instances: vec![instance],
                });
            }
        }
    }

    trace!(custom = custom.len(), groups = groups.len(), "built task groups");

    custom
        .into_iter()
        .chain(groups.into_iter().map(TaskItem::Group))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc};

    use super::{build_groups, group_key};
    use crate::datetime::local_midnight;
    use crate::task::{Task, TaskItem, TaskType};

    fn day(m: u32, d: u32) -> DateTime<Utc> {
        local_midnight(NaiveDate::from_ymd_opt(2024, m, d).expect("valid date"))
    }

    fn harvest(id: &str, plant: &str) -> Task {
        let mut task = Task::new(id, TaskType::Harvest, "Harvest tomatoes", day(6, 9), day(6, 11));
        task.path = Some("/container/1/slot/0".to_string());
        task.plant_instance_id = Some(plant.to_string());
        task
    }

    fn groups_of(items: &[TaskItem]) -> Vec<&crate::task::TaskGroup> {
        items
            .iter()
            .filter_map(|item| match item {
                TaskItem::Group(group) => Some(group),
                TaskItem::Single(_) => None,
            })
            .collect()
    }

    #[test]
    fn same_shape_harvests_fold_into_one_group() {
        let out = build_groups(&[harvest("a", "pi-1"), harvest("b", "pi-2")]);
        assert_eq!(out.len(), 1);
        let groups = groups_of(&out);
        assert_eq!(groups.len(), 1);
        let ids: Vec<_> = groups[0].instances.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(groups[0].instances[1].plant_instance_id.as_deref(), Some("pi-2"));
    }

    #[test]
    fn equal_dates_group_regardless_of_position() {
        let mut other = harvest("x", "pi-9");
        other.text = "Harvest basil".to_string();
        let tasks = vec![harvest("a", "pi-1"), other, harvest("b", "pi-2")];
        let out = build_groups(&tasks);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].task_ids(), vec!["a", "b"]);
        assert_eq!(out[1].task_ids(), vec!["x"]);
    }

    #[test]
    fn differing_completion_splits_groups() {
        let mut done = harvest("b", "pi-2");
        done.completed_on = Some(day(6, 10));
        let out = build_groups(&[harvest("a", "pi-1"), done]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn custom_tasks_never_group_and_lead() {
        let custom = |id: &str| Task::new(id, TaskType::Custom, "Water", day(6, 1), day(6, 2));
        let tasks = vec![harvest("a", "pi-1"), custom("c1"), custom("c2")];
        let out = build_groups(&tasks);
        assert_eq!(out.len(), 3);
        assert!(matches!(&out[0], TaskItem::Single(t) if t.id == "c1"));
        assert!(matches!(&out[1], TaskItem::Single(t) if t.id == "c2"));
        assert!(matches!(&out[2], TaskItem::Group(_)));
    }

    #[test]
    fn grouping_is_repeatable() {
        let mut fert = harvest("f", "pi-3");
        fert.kind = TaskType::Fertilize;
        let tasks = vec![harvest("a", "pi-1"), fert, harvest("b", "pi-2")];
        assert_eq!(build_groups(&tasks), build_groups(&tasks));
    }

    #[test]
    fn key_does_not_collide_on_concatenation() {
        let mut left = harvest("a", "pi-1");
        left.path = Some("/xHarvest".to_string());
        left.text = "y".to_string();
        let mut right = harvest("b", "pi-2");
        right.path = Some("/x".to_string());
        right.text = "Harvesty".to_string();
        assert_ne!(group_key(&left), group_key(&right));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(build_groups(&[]).is_empty());
    }
}
