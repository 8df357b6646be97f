//! Work items carried by the task queue.

use distbot_core::Event;
use serde::{Deserialize, Serialize};

use crate::handlers::HandlerInvocation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    /// A freshly parsed event, routed by the dispatcher.
    ProcessEvent { event: Event },
    /// One handler run, used for retries and for handlers scheduled by
    /// other handlers (tests after a finished Copr build).
    RunHandler(HandlerInvocation),
    /// Poll the image builder until a compose finishes.
    BabysitVmImageBuild { build_id: String, attempt: u32 },
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::ProcessEvent { .. } => "process_event",
            Task::RunHandler(_) => "run_handler",
            Task::BabysitVmImageBuild { .. } => "babysit_vm_image_build",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distbot_core::event::TestingFarmResultsEvent;

    #[test]
    fn test_payload_shape() {
        let task = Task::ProcessEvent {
            event: Event::TestingFarmResults(TestingFarmResultsEvent {
                pipeline_id: "5e8079d8".into(),
            }),
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["task"], "process_event");
        assert_eq!(value["event"]["type"], "testing_farm_results");

        let back: Task = serde_json::from_value(value).unwrap();
        assert_eq!(back, task);
        assert_eq!(back.name(), "process_event");
    }

    #[test]
    fn test_babysit_payload() {
        let task = Task::BabysitVmImageBuild {
            build_id: "compose-1".into(),
            attempt: 3,
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["task"], "babysit_vm_image_build");
        assert_eq!(value["attempt"], 3);
    }
}
