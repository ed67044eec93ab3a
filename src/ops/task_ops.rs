use crate::model::task::{NewTask, Task, TaskPatch, ToggleField, ToggleIntent, is_temp_id};

/// Error type for intents rejected before anything is sent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("task {0} is still being created")]
    PendingTask(String),
    #[error("nothing to update")]
    EmptyPatch,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Trimmed title, or an error if nothing is left
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

/// Normalize a create payload: trimmed title, blank category dropped.
pub fn validate_new_task(mut input: NewTask) -> Result<NewTask, ValidationError> {
    input.title = validate_title(&input.title)?;
    input.category = input
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    Ok(input)
}

/// A patch may omit the title, but a present one must be non-empty.
pub fn validate_patch(mut patch: TaskPatch) -> Result<TaskPatch, ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::EmptyPatch);
    }
    if let Some(title) = patch.title.as_deref() {
        patch.title = Some(validate_title(title)?);
    }
    Ok(patch)
}

/// The server has never seen a temporary id, so nothing can target it yet.
pub fn ensure_persisted(id: &str) -> Result<(), ValidationError> {
    if is_temp_id(id) {
        return Err(ValidationError::PendingTask(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// List transformations. Each returns a new list and leaves the input alone.
// ---------------------------------------------------------------------------

/// `task` followed by `tasks`
pub fn prepend(tasks: &[Task], task: Task) -> Vec<Task> {
    let mut out = Vec::with_capacity(tasks.len() + 1);
    out.push(task);
    out.extend(tasks.iter().cloned());
    out
}

/// Apply a toggle to the task with `id`; every other task is untouched.
/// Unknown ids leave the list as it was.
pub fn with_toggled(
    tasks: &[Task],
    id: &str,
    field: ToggleField,
    intent: ToggleIntent,
) -> Vec<Task> {
    tasks
        .iter()
        .map(|t| {
            if t.id == id {
                let mut t = t.clone();
                let next = intent.resolve(field.get(&t));
                field.set(&mut t, next);
                t
            } else {
                t.clone()
            }
        })
        .collect()
}

/// The list without the task with `id`
pub fn without(tasks: &[Task], id: &str) -> Vec<Task> {
    tasks.iter().filter(|t| t.id != id).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support::{done_task, task};
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<Task> {
        vec![task("a", "First"), done_task("b", "Second"), task("c", "Third")]
    }

    // --- Validation ---

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("  Buy milk "), Ok("Buy milk".to_string()));
        assert_eq!(validate_title("   "), Err(ValidationError::EmptyTitle));
        assert_eq!(validate_title(""), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn test_validate_new_task_drops_blank_category() {
        let input = validate_new_task(NewTask::new(" x ").with_category("  ")).unwrap();
        assert_eq!(input.title, "x");
        assert_eq!(input.category, None);
    }

    #[test]
    fn test_validate_patch() {
        assert_eq!(
            validate_patch(TaskPatch::default()),
            Err(ValidationError::EmptyPatch)
        );
        let ok = TaskPatch {
            title: Some(" Renamed ".into()),
            ..Default::default()
        };
        assert_eq!(validate_patch(ok).unwrap().title.as_deref(), Some("Renamed"));
        let bad = TaskPatch {
            title: Some(" ".into()),
            ..Default::default()
        };
        assert_eq!(validate_patch(bad), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn test_ensure_persisted() {
        assert!(ensure_persisted("65f1").is_ok());
        assert_eq!(
            ensure_persisted("temp-1"),
            Err(ValidationError::PendingTask("temp-1".into()))
        );
    }

    // --- Transformations ---

    #[test]
    fn test_prepend() {
        let out = prepend(&sample(), task("z", "New"));
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].id, "z");
        assert_eq!(out[1..], sample()[..]);
    }

    #[test]
    fn test_toggle_flip_only_touches_target() {
        let out = with_toggled(&sample(), "a", ToggleField::Done, ToggleIntent::Flip);
        assert!(out[0].done);
        assert_eq!(out[1], sample()[1]);
        assert_eq!(out[2], sample()[2]);
    }

    #[test]
    fn test_toggle_set_to() {
        let out = with_toggled(&sample(), "b", ToggleField::Done, ToggleIntent::SetTo(true));
        assert!(out[1].done);
        let out = with_toggled(&sample(), "b", ToggleField::Archived, ToggleIntent::SetTo(true));
        assert!(out[1].archived);
        assert!(out[1].done);
    }

    #[test]
    fn test_toggle_unknown_id_is_noop() {
        let out = with_toggled(&sample(), "nope", ToggleField::Done, ToggleIntent::Flip);
        assert_eq!(out, sample());
    }

    #[test]
    fn test_without() {
        let out = without(&sample(), "b");
        let ids: Vec<&str> = out.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(without(&sample(), "nope"), sample());
    }
}
