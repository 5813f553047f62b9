use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::intent::{help_text, Intent};
use crate::models::*;
use crate::store::*;

/// Longest project title a status or progress command may target.
pub const MAX_TITLE_CHARS: usize = 200;

/// Runs one [`Intent`] against a [`DataStore`] and renders the reply.
pub struct Executor<'a> {
    store: &'a dyn DataStore,
    user_id: Option<Uuid>,
    list_limit: usize,
}

impl<'a> Executor<'a> {
    pub fn new(store: &'a dyn DataStore, user_id: Option<Uuid>, list_limit: usize) -> Self {
        Self {
            store,
            user_id,
            list_limit,
        }
    }

    pub async fn execute(&self, intent: Intent) -> Result<String, StoreError> {
        match intent {
            Intent::Help => Ok(help_text()),
            Intent::ListProjects => self.list_projects().await,
            Intent::CreateProject { title, deadline } => self.create_project(title, deadline).await,
            Intent::SetStatus { title, status } => self.set_status(&title, status).await,
            Intent::SetProgress { title, value } => self.set_progress(&title, value).await,
            Intent::OverdueTasks => self.overdue_tasks().await,
            Intent::Unrecognized { hint: Some(hint) } => Ok(hint.to_string()),
            Intent::Unrecognized { hint: None } => {
                Ok(format!("I didn't understand.\n{}", help_text()))
            }
        }
    }

    async fn list_projects(&self) -> Result<String, StoreError> {
        let query = Query::new(Table::Projects)
            .order_by(Column::UpdatedAt, false)
            .limit(self.list_limit);
        let projects: Vec<Project> = self
            .store
            .query(&query)
            .await?
            .into_iter()
            .filter_map(Row::into_project)
            .collect();

        if projects.is_empty() {
            return Ok("You have no projects yet.".to_string());
        }

        let lines: Vec<String> = projects
            .iter()
            .map(|p| {
                let due = p
                    .deadline
                    .map(|d| format!(", due {}", format_date(d)))
                    .unwrap_or_default();
                format!("• {} ({}) – {}%{}", p.title, p.status, p.progress, due)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    async fn create_project(
        &self,
        title: String,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<String, StoreError> {
        if title.is_empty() {
            return Ok("Please provide a project title.".to_string());
        }

        let input = CreateProjectInput {
            title: title.clone(),
            description: None,
            status: Some(ProjectStatus::Planning),
            progress: Some(0),
            deadline,
            manager_id: self.user_id,
        };
        let id = self.store.insert(NewRecord::Project(input)).await?;
        tracing::info!(project_id = %id, "Assistant created project {:?}", title);

        let due = deadline
            .map(|d| format!(" (due {})", format_date(d)))
            .unwrap_or_default();
        Ok(format!("Created project \"{}\"{}.", title, due))
    }

    async fn set_status(&self, title: &str, status: ProjectStatus) -> Result<String, StoreError> {
        let title = match validate_title(title) {
            Ok(title) => title,
            Err(message) => return Ok(message),
        };

        let patch = Patch::Project(UpdateProjectInput {
            status: Some(status),
            ..Default::default()
        });
        let count = self.update_by_title(title, &patch).await?;

        Ok(describe_update(count, title, || {
            format!("Updated status of \"{}\" to {}.", title, status)
        }))
    }

    async fn set_progress(&self, title: &str, value: f64) -> Result<String, StoreError> {
        let title = match validate_title(title) {
            Ok(title) => title,
            Err(message) => return Ok(message),
        };

        let progress = clamp_progress(value);
        let patch = Patch::Project(UpdateProjectInput {
            progress: Some(progress),
            ..Default::default()
        });
        let count = self.update_by_title(title, &patch).await?;

        Ok(describe_update(count, title, || {
            format!("Updated progress of \"{}\" to {}%.", title, progress)
        }))
    }

    /// Apply `patch` to every project whose title contains `title`, ignoring case.
    async fn update_by_title(&self, title: &str, patch: &Patch) -> Result<usize, StoreError> {
        let pattern = format!("%{}%", escape_like(title));
        let count = self
            .store
            .update(Table::Projects, &[Filter::ilike(Column::Title, pattern)], patch)
            .await?;
        tracing::debug!(title, count, "Updated projects by title");
        Ok(count)
    }

    async fn overdue_tasks(&self) -> Result<String, StoreError> {
        let query = Query::new(Table::Tasks)
            .filter(Filter::neq(Column::Status, TaskStatus::Done.as_str()))
            .filter(Filter::lt(Column::DueDate, Utc::now()))
            .order_by(Column::DueDate, true)
            .limit(self.list_limit);
        let tasks: Vec<Task> = self
            .store
            .query(&query)
            .await?
            .into_iter()
            .filter_map(Row::into_task)
            .collect();

        if tasks.is_empty() {
            return Ok("No overdue tasks. Great job!".to_string());
        }

        let lines: Vec<String> = tasks
            .iter()
            .map(|t| {
                let due = t
                    .due_date
                    .map(format_date)
                    .unwrap_or_else(|| "unknown".to_string());
                format!("• {} – due {} ({})", t.title, due, t.status)
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

fn validate_title(title: &str) -> Result<&str, String> {
    let title = title.trim();
    let len = title.chars().count();
    if len == 0 || len > MAX_TITLE_CHARS {
        return Err(format!(
            "Project title must be between 1 and {} characters.",
            MAX_TITLE_CHARS
        ));
    }
    Ok(title)
}

fn describe_update(count: usize, title: &str, updated_one: impl FnOnce() -> String) -> String {
    match count {
        0 => format!("No project found matching \"{}\".", title),
        1 => updated_one(),
        n => format!(
            "Warning: Updated {} projects matching \"{}\". Consider using more specific titles.",
            n, title
        ),
    }
}

/// Round to the nearest integer and clamp into 0..=100.
pub fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// `M/D/YYYY`, in UTC.
pub fn format_date(date: DateTime<Utc>) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clamp_progress_rounds_and_clamps() {
        assert_eq!(clamp_progress(-5.0), 0);
        assert_eq!(clamp_progress(150.0), 100);
        assert_eq!(clamp_progress(62.5), 63);
        assert_eq!(clamp_progress(62.4), 62);
        assert_eq!(clamp_progress(f64::NAN), 0);
    }

    #[test]
    fn format_date_is_month_day_year() {
        let date = Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(format_date(date), "1/31/2025");
    }

    #[test]
    fn validate_title_bounds() {
        assert!(validate_title("   ").is_err());
        assert_eq!(validate_title("  Launch "), Ok("Launch"));
        assert!(validate_title(&"x".repeat(200)).is_ok());
        assert!(validate_title(&"x".repeat(201)).is_err());
    }

    #[test]
    fn describe_update_by_count() {
        let one = || "one".to_string();
        assert_eq!(
            describe_update(0, "Nope", one),
            "No project found matching \"Nope\"."
        );
        assert_eq!(describe_update(1, "Launch", one), "one");
        assert_eq!(
            describe_update(2, "Beta Test", one),
            "Warning: Updated 2 projects matching \"Beta Test\". Consider using more specific titles."
        );
    }
}
