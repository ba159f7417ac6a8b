use forgeline::controller::{AgentAddr, AgentRegistry, AgentStatus, Build};

fn addr() -> AgentAddr {
    AgentAddr::new("10.0.0.5", 8001)
}

#[test]
fn register_is_idempotent() {
    let mut registry = AgentRegistry::new();

    registry.register(addr());
    registry.register(addr());
    registry.register(addr());

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(&addr()).unwrap().status, AgentStatus::Waiting);
}

#[test]
fn register_resets_a_working_agent() {
    let mut registry = AgentRegistry::new();
    registry.register(addr());
    registry.set_status(
        &addr(),
        AgentStatus::Working,
        Some(Build::new("b1", "abc123")),
    );

    // A restarted agent checks in again; it is idle and carries nothing.
    registry.register(addr());

    let state = registry.get(&addr()).unwrap();
    assert_eq!(state.status, AgentStatus::Waiting);
    assert!(state.build.is_none());
}

#[test]
fn set_status_for_unknown_agent_is_a_noop() {
    let mut registry = AgentRegistry::new();

    let updated = registry.set_status(&addr(), AgentStatus::Waiting, None);

    assert!(!updated);
    assert!(registry.is_empty());
}

#[test]
fn reserve_idle_transitions_to_trying() {
    let mut registry = AgentRegistry::new();
    registry.register(addr());

    let reserved = registry.reserve_idle().unwrap();

    assert_eq!(reserved, addr());
    assert_eq!(registry.get(&addr()).unwrap().status, AgentStatus::Trying);
}

#[test]
fn reserve_idle_never_hands_out_the_same_agent_twice() {
    let mut registry = AgentRegistry::new();
    registry.register(addr());

    assert!(registry.reserve_idle().is_some());
    assert!(registry.reserve_idle().is_none());
}

#[test]
fn reserve_idle_skips_busy_agents() {
    let mut registry = AgentRegistry::new();
    registry.register(addr());
    registry.set_status(
        &addr(),
        AgentStatus::Working,
        Some(Build::new("b1", "abc123")),
    );

    assert!(registry.reserve_idle().is_none());
}

#[test]
fn remove_returns_the_build_of_a_working_agent() {
    let mut registry = AgentRegistry::new();
    registry.register(addr());
    let build = Build::new("b1", "abc123");
    registry.set_status(&addr(), AgentStatus::Working, Some(build.clone()));

    let lost = registry.remove(&addr());

    assert_eq!(lost, Some(build));
    assert!(registry.is_empty());
}

#[test]
fn remove_returns_nothing_for_trying_or_waiting_agents() {
    let mut registry = AgentRegistry::new();

    registry.register(addr());
    assert!(registry.remove(&addr()).is_none());

    registry.register(addr());
    registry.reserve_idle();
    assert!(registry.remove(&addr()).is_none());

    assert!(registry.remove(&addr()).is_none());
}

#[test]
fn working_agents_always_carry_their_build() {
    let mut registry = AgentRegistry::new();
    registry.register(addr());
    registry.set_status(
        &addr(),
        AgentStatus::Working,
        Some(Build::new("b1", "abc123")),
    );

    let state = registry.get(&addr()).unwrap();
    assert_eq!(state.status, AgentStatus::Working);
    assert_eq!(state.build.as_ref().unwrap().id, "b1");
}

#[test]
fn waiting_count_tracks_idle_agents_only() {
    let mut registry = AgentRegistry::new();
    registry.register(AgentAddr::new("10.0.0.5", 8001));
    registry.register(AgentAddr::new("10.0.0.6", 8001));
    registry.register(AgentAddr::new("10.0.0.7", 8001));
    assert_eq!(registry.waiting_count(), 3);

    registry.reserve_idle();
    assert_eq!(registry.waiting_count(), 2);
    assert_eq!(registry.len(), 3);
}

#[test]
fn agents_on_the_same_host_are_distinct_by_port() {
    let mut registry = AgentRegistry::new();
    registry.register(AgentAddr::new("10.0.0.5", 8001));
    registry.register(AgentAddr::new("10.0.0.5", 8002));

    assert_eq!(registry.len(), 2);
}
