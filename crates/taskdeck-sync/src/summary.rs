use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use taskdeck_core::{Task, TaskStatus};

/// Headline counts for the dashboard cards.
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct BoardSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl BoardSummary {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut summary = Self {
            total: tasks.len(),
            ..Self::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Completed => summary.completed += 1,
            }
        }
        summary
    }
}

/// One day on the completion-trend chart.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TrendPoint {
    pub day: NaiveDate,
    /// Short weekday label for the chart axis ("Mon".."Sun").
    pub label: String,
    pub created: usize,
    pub completed: usize,
}

/// Seven points ending on `end`, oldest first.
///
/// The stored document shape has no completion timestamp, so a
/// completed task counts toward its creation day.
pub fn trend_series(tasks: &[Task], end: NaiveDate) -> Vec<TrendPoint> {
    (0..7)
        .rev()
        .map(|back| {
            let day = end - Duration::days(back);
            let on_day = tasks
                .iter()
                .filter(|t| t.created_at.date_naive() == day);
            let (mut created, mut completed) = (0, 0);
            for task in on_day {
                created += 1;
                if task.status == TaskStatus::Completed {
                    completed += 1;
                }
            }
            TrendPoint {
                day,
                label: day.weekday().to_string(),
                created,
                completed,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use taskdeck_core::{Priority, TaskId, UserId};

    fn task_on(day: NaiveDate, status: TaskStatus) -> Task {
        Task {
            id: TaskId::new(),
            title: "t".into(),
            description: String::new(),
            priority: Priority::Medium,
            user_id: UserId::from_raw("user_1"),
            created_at: Utc
                .from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap()),
            activities: vec![],
            status,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn summary_counts_by_status() {
        let end = date(2026, 3, 6);
        let tasks = vec![
            task_on(end, TaskStatus::Pending),
            task_on(end, TaskStatus::Pending),
            task_on(end, TaskStatus::InProgress),
            task_on(end, TaskStatus::Completed),
        ];
        let summary = BoardSummary::from_tasks(&tasks);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.in_progress, 1);
        assert_eq!(summary.completed, 1);
    }

    #[test]
    fn summary_of_empty_board() {
        assert_eq!(BoardSummary::from_tasks(&[]), BoardSummary::default());
    }

    #[test]
    fn trend_has_seven_points_oldest_first() {
        let end = date(2026, 3, 6);
        let series = trend_series(&[], end);
        assert_eq!(series.len(), 7);
        assert_eq!(series[0].day, date(2026, 2, 28));
        assert_eq!(series[6].day, end);
        for w in series.windows(2) {
            assert!(w[0].day < w[1].day);
        }
    }

    #[test]
    fn trend_buckets_by_creation_day() {
        let end = date(2026, 3, 6);
        let tasks = vec![
            task_on(date(2026, 3, 6), TaskStatus::Completed),
            task_on(date(2026, 3, 6), TaskStatus::Pending),
            task_on(date(2026, 3, 4), TaskStatus::Completed),
            // Outside the window: ignored
            task_on(date(2026, 2, 20), TaskStatus::Pending),
        ];
        let series = trend_series(&tasks, end);

        let total_created: usize = series.iter().map(|p| p.created).sum();
        assert_eq!(total_created, 3, "only tasks created in the window count");

        let last = &series[6];
        assert_eq!(last.created, 2);
        assert_eq!(last.completed, 1);

        let midweek = series.iter().find(|p| p.day == date(2026, 3, 4)).unwrap();
        assert_eq!(midweek.created, 1);
        assert_eq!(midweek.completed, 1);
    }

    #[test]
    fn trend_labels_are_weekdays() {
        // 2026-03-06 is a Friday.
        let series = trend_series(&[], date(2026, 3, 6));
        assert_eq!(series[6].label, "Fri");
        assert_eq!(series[0].label, "Sat");
    }
}
