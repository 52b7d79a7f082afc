//! Tests for the assertion-coverage registry and the target bookkeeping.

mod common;

/// The hex-encoded `AssertionFailed(string)` topic.
const ASSERTION_TOPIC: &str = "b42604cb105a16c8f6db8a41e6b00c0c1b4826465e8bc504b3eb3e88b3e6a4a0";

#[test]
fn covered_assertions_suppress_invalid_opcode_failures() -> anyhow::Result<()> {
    // CALLVALUE; PUSH1 6; JUMPI; INVALID; STOP; JUMPDEST; STOP
    //
    // The fallthrough hits INVALID at pc 4; once that assertion is recorded
    // as covered, the only reportable outcomes are the halts.
    let code = "346006 57 fe 00 5b00";
    let code = code.replace(' ', "");
    let hash = common::code_hash(&common::bytecode(code.as_str())?);

    let mut uncovered = common::started_analyzer(code.as_str(), &[])?;
    let verdict = uncovered.can_ignore_suffix().expect("query failed");
    assert!(!verdict.can_ignore);
    assert_eq!(verdict.cause.as_deref(), Some("invalid-opcode"));

    let mut covered = common::started_analyzer(code.as_str(), &[])?;
    covered.record_covered_assertion(*hash.as_bytes(), 4);
    assert!(covered.is_covered_assertion(*hash.as_bytes(), 4));

    let verdict = covered.can_ignore_suffix().expect("query failed");
    assert!(verdict.can_ignore, "cause: {:?}", verdict.cause);

    Ok(())
}

#[test]
fn covered_assertions_reached_by_the_prefix_do_not_fail() -> anyhow::Result<()> {
    // PUSH1 1; POP; INVALID with the whole program inside the prefix and
    // the assertion site covered: the replayed path just ends there.
    let code = "600150fe";
    let hash = common::code_hash(&common::bytecode(code)?);

    let mut analyzer = common::started_analyzer(code, &[0, 2, 3])?;
    analyzer.record_covered_assertion(*hash.as_bytes(), 3);

    let verdict = analyzer.can_ignore_suffix().expect("query failed");
    assert!(verdict.can_ignore, "cause: {:?}", verdict.cause);

    Ok(())
}

#[test]
fn coverage_is_keyed_by_code_hash_and_pc() -> anyhow::Result<()> {
    let code = "fe";
    let mut analyzer = common::started_analyzer(code, &[])?;

    // Covering a different position, or the same position in different
    // code, changes nothing.
    let hash = common::code_hash(&common::bytecode(code)?);
    let other_hash = common::code_hash(&common::bytecode("00")?);
    analyzer.record_covered_assertion(*hash.as_bytes(), 1);
    analyzer.record_covered_assertion(*other_hash.as_bytes(), 0);

    let verdict = analyzer.can_ignore_suffix().expect("query failed");
    assert!(!verdict.can_ignore);

    Ok(())
}

#[test]
fn targeting_mode_reports_assertion_failed_events() -> anyhow::Result<()> {
    // PUSH32 <topic>; PUSH1 0; PUSH1 0; LOG1; STOP
    let code = format!("7f{ASSERTION_TOPIC}60006000a100");

    let mut untargeted = common::started_analyzer(code.as_str(), &[])?;
    let verdict = untargeted.can_ignore_suffix().expect("query failed");
    assert!(verdict.can_ignore);

    let mut targeted = common::started_analyzer(code.as_str(), &[])?;
    targeted.target_assertion_failed_events();
    let verdict = targeted.can_ignore_suffix().expect("query failed");
    assert!(!verdict.can_ignore);
    assert_eq!(
        verdict.cause.as_deref(),
        Some("reached-assertion-failed")
    );

    Ok(())
}

#[test]
fn targeting_mode_ignores_other_topics() -> anyhow::Result<()> {
    // PUSH32 <some other topic>; PUSH1 0; PUSH1 0; LOG1; STOP
    let code = format!("7f{}60006000a100", "11".repeat(32));

    let mut analyzer = common::started_analyzer(code.as_str(), &[])?;
    analyzer.target_assertion_failed_events();
    let verdict = analyzer.can_ignore_suffix().expect("query failed");
    assert!(verdict.can_ignore);

    Ok(())
}

#[test]
fn target_instructions_make_their_suffix_unprunable() -> anyhow::Result<()> {
    // PUSH1 1; POP; STOP
    let code = "60015000";
    let hash = common::code_hash(&common::bytecode(code)?);

    let mut analyzer = common::started_analyzer(code, &[])?;
    analyzer.add_target_instruction(*hash.as_bytes(), 3);
    let verdict = analyzer.can_ignore_suffix().expect("query failed");
    assert!(!verdict.can_ignore);
    assert_eq!(
        verdict.cause.as_deref(),
        Some("reached-target-instruction")
    );

    Ok(())
}

#[test]
fn target_gating_is_suppressed_during_prefix_replay() -> anyhow::Result<()> {
    // PUSH1 1; POP; STOP, with the whole program inside the prefix and the
    // POP registered as a target: replay must not fail on it.
    let code = "60015000";
    let hash = common::code_hash(&common::bytecode(code)?);

    let mut analyzer = common::started_analyzer(code, &[0, 2])?;
    analyzer.add_target_instruction(*hash.as_bytes(), 2);
    let verdict = analyzer.can_ignore_suffix().expect("query failed");
    assert!(verdict.can_ignore, "cause: {:?}", verdict.cause);

    Ok(())
}
