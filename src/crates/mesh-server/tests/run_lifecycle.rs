//! Drives a run end to end through `prepare_run` + `drive_run` against the
//! in-memory history store, without any network or real provider.

use std::sync::Arc;

use futures::StreamExt;
use mesh_checkpoint::InMemoryCheckpointer;
use mesh_events::RunStatus;
use mesh_server::config::ServerConfig;
use mesh_server::driver::drive_run;
use mesh_server::history::memory::InMemoryHistoryStore;
use mesh_server::history::HistoryStore;
use mesh_server::run_request::{prepare_run, AgentSpecBody, RunRequestBody};

fn single_agent_body(reply: &str) -> RunRequestBody {
    RunRequestBody {
        mode: "single".to_string(),
        prompt: "say hello".to_string(),
        agents: vec![AgentSpecBody {
            name: "alpha".to_string(),
            model_id: format!("mock:{reply}"),
            system_prompt: "be terse".to_string(),
            tools: Vec::new(),
            session_id: None,
        }],
        edges: Vec::new(),
        entry_point: None,
        entry_points: Vec::new(),
        max_handoffs: None,
        session_id: None,
        structured_output_schema: None,
        preset_key: None,
    }
}

#[tokio::test]
async fn a_single_agent_run_completes_and_is_persisted() {
    let config = ServerConfig::from_env();
    let prepared = prepare_run(single_agent_body("all good"), &config).unwrap();
    let run_id = prepared.run_id;

    let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
    let checkpointer: Arc<dyn mesh_checkpoint::Checkpointer> = Arc::new(InMemoryCheckpointer::new());
    let stream = drive_run(prepared, history.clone(), checkpointer);
    tokio::pin!(stream);
    let mut event_count = 0;
    while stream.next().await.is_some() {
        event_count += 1;
    }
    assert!(event_count > 0);

    let summary = history.get_run(run_id).await.unwrap().expect("run should be persisted");
    assert_eq!(summary.status, RunStatus::Completed);
    assert!(summary.persistence_finalized);

    let events = history.get_run_events(run_id).await.unwrap();
    assert!(!events.is_empty());
}

#[tokio::test]
async fn a_swarm_handoff_between_two_agents_completes() {
    let config = ServerConfig::from_env();
    let mut body = single_agent_body("ignored");
    body.mode = "swarm".to_string();
    body.agents = vec![
        AgentSpecBody {
            name: "alpha".to_string(),
            model_id: "mock:hand it off".to_string(),
            system_prompt: String::new(),
            tools: Vec::new(),
            session_id: None,
        },
        AgentSpecBody {
            name: "bravo".to_string(),
            model_id: "mock:wrapping up".to_string(),
            system_prompt: String::new(),
            tools: Vec::new(),
            session_id: None,
        },
    ];
    let prepared = prepare_run(body, &config).unwrap();
    let run_id = prepared.run_id;

    let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
    let checkpointer: Arc<dyn mesh_checkpoint::Checkpointer> = Arc::new(InMemoryCheckpointer::new());
    let stream = drive_run(prepared, history.clone(), checkpointer);
    tokio::pin!(stream);
    while stream.next().await.is_some() {}

    let summary = history.get_run(run_id).await.unwrap().expect("run should be persisted");
    assert!(matches!(summary.status, RunStatus::Completed | RunStatus::Failed));
}

#[tokio::test]
async fn a_rejected_request_never_reaches_the_driver() {
    let config = ServerConfig::from_env();
    let mut body = single_agent_body("x");
    body.mode = "not-a-real-mode".to_string();
    assert!(prepare_run(body, &config).is_err());
}
