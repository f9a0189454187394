//! Sub-task tracking driven by typed stream messages.

use std::collections::HashMap;

use tracing::debug;

use crate::models::{Message, MessageType, Task, TaskStatus};

/// Tasks per session, in the order they were first reported.
#[derive(Debug, Default)]
pub struct TaskBoard {
    tasks: HashMap<String, Vec<Task>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a typed message. Messages without a task id, or of a type
    /// that carries no task transition, are ignored. Returns whether the
    /// board changed.
    pub fn apply(&mut self, session_id: &str, message: &Message) -> bool {
        let (Some(kind), Some(task_id)) = (message.message_type, message.task_id.as_deref()) else {
            return false;
        };

        let tasks = self.tasks.entry(session_id.to_string()).or_default();
        let existing = tasks.iter().position(|t| t.id == task_id);

        match kind {
            MessageType::TaskSplit | MessageType::TaskExec => {
                let name = message.task_name.as_deref().unwrap_or(task_id);
                match existing {
                    Some(i) => {
                        let task = &mut tasks[i];
                        task.name = name.to_string();
                        if !message.content.is_empty() {
                            task.content = Some(message.content.clone());
                        }
                    }
                    None => {
                        let mut task = Task::new(task_id, name);
                        if !message.content.is_empty() {
                            task.content = Some(message.content.clone());
                        }
                        tasks.push(task);
                    }
                }
                true
            }
            MessageType::TaskStatusToLoading => {
                let task = match existing {
                    Some(i) => &mut tasks[i],
                    None => {
                        // status before split; track it anyway
                        let name = message.task_name.as_deref().unwrap_or(task_id);
                        tasks.push(Task::new(task_id, name));
                        let last = tasks.len() - 1;
                        &mut tasks[last]
                    }
                };
                if task.status.is_terminal() {
                    debug!(session_id, task_id, status = %task.status, "late loading ignored");
                    return false;
                }
                task.set_status(TaskStatus::Loading);
                true
            }
            MessageType::TaskStatusToFinish => {
                let Some(i) = existing else {
                    debug!(session_id, task_id, "finish for unknown task");
                    return false;
                };
                let task = &mut tasks[i];
                task.set_status(TaskStatus::Completed);
                if !message.content.is_empty() {
                    task.result = Some(message.content.clone());
                }
                true
            }
            MessageType::Text | MessageType::ToolCall | MessageType::TaskSplitFinish => false,
        }
    }

    pub fn tasks(&self, session_id: &str) -> &[Task] {
        self.tasks.get(session_id).map_or(&[], Vec::as_slice)
    }

    pub fn get(&self, session_id: &str, task_id: &str) -> Option<&Task> {
        self.tasks(session_id).iter().find(|t| t.id == task_id)
    }

    pub fn remove_session(&mut self, session_id: &str) {
        self.tasks.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(kind: MessageType, task_id: &str, content: &str) -> Message {
        Message::assistant("s", content)
            .with_type(kind)
            .with_task(Some(task_id.to_string()), Some(format!("task {task_id}")))
    }

    #[test]
    fn split_loading_finish() {
        let mut board = TaskBoard::new();
        assert!(board.apply("s", &typed(MessageType::TaskSplit, "t1", "")));
        assert_eq!(board.get("s", "t1").unwrap().status, TaskStatus::Pending);

        board.apply("s", &typed(MessageType::TaskStatusToLoading, "t1", ""));
        assert_eq!(board.get("s", "t1").unwrap().status, TaskStatus::Loading);

        board.apply("s", &typed(MessageType::TaskStatusToFinish, "t1", "42 results"));
        let task = board.get("s", "t1").unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_deref(), Some("42 results"));
        assert_eq!(task.progress, Some(100));
    }

    #[test]
    fn matches_by_task_id() {
        let mut board = TaskBoard::new();
        board.apply("s", &typed(MessageType::TaskExec, "a", "searching"));
        board.apply("s", &typed(MessageType::TaskExec, "b", "reading"));
        board.apply("s", &typed(MessageType::TaskStatusToLoading, "b", ""));

        assert_eq!(board.get("s", "a").unwrap().status, TaskStatus::Pending);
        assert_eq!(board.get("s", "b").unwrap().status, TaskStatus::Loading);
        assert_eq!(board.tasks("s").len(), 2);
    }

    #[test]
    fn late_loading_does_not_reopen_finished_task() {
        let mut board = TaskBoard::new();
        board.apply("s", &typed(MessageType::TaskSplit, "t1", ""));
        board.apply("s", &typed(MessageType::TaskStatusToFinish, "t1", "ok"));
        assert!(!board.apply("s", &typed(MessageType::TaskStatusToLoading, "t1", "")));
        assert_eq!(board.get("s", "t1").unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn ignores_untyped_and_unknown() {
        let mut board = TaskBoard::new();
        assert!(!board.apply("s", &Message::assistant("s", "plain")));
        let no_id = Message::assistant("s", "x").with_type(MessageType::TaskExec);
        assert!(!board.apply("s", &no_id));
        assert!(!board.apply("s", &typed(MessageType::TaskStatusToFinish, "ghost", "")));
        assert!(board.tasks("s").is_empty());
    }
}
