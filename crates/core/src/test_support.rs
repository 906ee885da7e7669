// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixture builders shared by this crate's tests and downstream crates
//! (behind the `test-support` feature).

use crate::interaction::{Interaction, InteractionKind};
use crate::project::{Project, ProjectId};
use crate::task::{Task, TaskId};
use crate::workflow::{Status, StatusId, Workflow, WorkflowId};
use std::collections::HashMap;

/// Draft (initial, →Review), Review (→Done), Done (terminal).
pub fn three_status_workflow() -> Workflow {
    Workflow {
        id: WorkflowId::new(),
        project_id: ProjectId::new(),
        name: "default".to_string(),
        statuses: vec![
            Status {
                id: StatusId::from("draft"),
                name: "Draft".to_string(),
                order: 1,
                is_initial: true,
                is_terminal: false,
                transitions: vec![StatusId::from("review")],
                agent_id: None,
                hooks: Vec::new(),
            },
            Status {
                id: StatusId::from("review"),
                name: "Review".to_string(),
                order: 2,
                is_initial: false,
                is_terminal: false,
                transitions: vec![StatusId::from("done")],
                agent_id: None,
                hooks: Vec::new(),
            },
            Status {
                id: StatusId::from("done"),
                name: "Done".to_string(),
                order: 3,
                is_initial: false,
                is_terminal: true,
                transitions: Vec::new(),
                agent_id: None,
                hooks: Vec::new(),
            },
        ],
        agent_configs: Vec::new(),
        created_at_ms: 1,
        updated_at_ms: 1,
    }
}

/// A project named "demo" wired for fixtures.
pub fn demo_project() -> Project {
    Project::new("demo", 1)
}

/// A task in the given workflow's initial status.
pub fn task_in(workflow: &Workflow, project: &Project) -> Task {
    let initial = workflow
        .initial_status()
        .map(|s| s.id.clone())
        .unwrap_or_else(|| StatusId::from("draft"));
    Task {
        id: TaskId::new(),
        project_id: project.id,
        workflow_id: workflow.id,
        title: "Implement the login page".to_string(),
        description: "Add a login form with validation".to_string(),
        status_id: initial,
        assigned_worker_id: None,
        assignment_status: Default::default(),
        metadata: HashMap::new(),
        use_worktree: false,
        permission_mode: Default::default(),
        created_at_ms: 1,
        updated_at_ms: 1,
    }
}

/// A pending question interaction for the given task.
pub fn question_for(task_id: TaskId) -> Interaction {
    Interaction::new(task_id, "agent-m1", InteractionKind::Question, "Need a decision", 1)
        .with_description("Should the form use OAuth?")
}
