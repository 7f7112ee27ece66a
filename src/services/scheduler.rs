use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::job::{ImageJob, JobStatus};

/// How queued jobs get dispatched to the remover.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Each job runs only when explicitly triggered; runs may overlap.
    Manual,
    /// One job at a time, earliest queued first, without user action.
    #[default]
    Sequential,
}

/// Pick the job the sequential runner should dispatch next.
///
/// Returns `None` while any job is processing, otherwise the earliest
/// queued job in insertion order.
pub fn select_next<'a, I>(jobs: I) -> Option<Uuid>
where
    I: IntoIterator<Item = &'a ImageJob>,
{
    let mut next = None;
    for job in jobs {
        match job.status() {
            JobStatus::Processing => return None,
            JobStatus::Queued if next.is_none() => next = Some(job.id()),
            _ => {}
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{ImagePayload, JobPatch, Pass};

    fn job(name: &str) -> ImageJob {
        ImageJob::new(name, ImagePayload::new(name.as_bytes().to_vec(), "image/png"))
    }

    fn with_status(mut job: ImageJob, patches: Vec<JobPatch>) -> ImageJob {
        for patch in patches {
            job.apply(patch).unwrap();
        }
        job
    }

    #[test]
    fn test_empty_selects_nothing() {
        assert_eq!(select_next(std::iter::empty::<&ImageJob>()), None);
    }

    #[test]
    fn test_earliest_queued_wins() {
        let done = with_status(
            job("a"),
            vec![
                JobPatch::Processing { pass: Pass::Full },
                JobPatch::Succeeded {
                    result: ImagePayload::new(&b"r"[..], "image/png"),
                },
            ],
        );
        let first = job("b");
        let second = job("c");
        let jobs = vec![done, first.clone(), second];
        assert_eq!(select_next(&jobs), Some(first.id()));
    }

    #[test]
    fn test_processing_blocks_selection() {
        let busy = with_status(job("a"), vec![JobPatch::Processing { pass: Pass::Full }]);
        let jobs = vec![job("b"), busy];
        assert_eq!(select_next(&jobs), None);
    }

    #[test]
    fn test_errors_are_not_picked_up_again() {
        let failed = with_status(
            job("a"),
            vec![
                JobPatch::Processing { pass: Pass::Full },
                JobPatch::Failed { message: "x".into() },
            ],
        );
        assert_eq!(select_next(&[failed]), None);
    }
}
