//! Scope nesting, restoration, and isolation between declared contexts.

use anyhow::Result;
use dynascope::{ContextError, ContextHandle, MapContext, Overrides, TypedContext};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Ctx {
    a: Option<i64>,
    b: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Ctx2 {
    c: Option<i64>,
    d: Option<i64>,
}

#[test]
fn mapping_nesting_restores_and_empties() -> Result<()> {
    static CTX: MapContext = MapContext::new("map_nesting");

    let outer = CTX.enter(Overrides::new().set("a", 1).set("b", 1))?;
    assert_eq!(CTX.get("a")?, json!(1));
    assert_eq!(CTX.get("b")?, json!(1));

    {
        let _inner = CTX.enter(Overrides::new().set("a", 2))?;
        assert_eq!(CTX.get("a")?, json!(2));
        // The untouched key shines through from the outer frame.
        assert_eq!(CTX.get("b")?, json!(1));
    }

    assert_eq!(CTX.get("a")?, json!(1));
    assert_eq!(CTX.get("b")?, json!(1));

    drop(outer);
    assert!(CTX.get("a").unwrap_err().is_key_not_found());
    assert!(CTX.current_frame().is_none());
    Ok(())
}

#[test]
fn record_nesting_restores_and_falls_back_to_defaults() -> Result<()> {
    static CTX: TypedContext<Ctx> = TypedContext::new("record_nesting");

    assert_eq!(CTX.current(), Ctx::default());

    let outer = CTX.enter(Overrides::new().set("a", 1).set("b", "b"))?;
    assert_eq!(CTX.current().a, Some(1));
    assert_eq!(CTX.current().b.as_deref(), Some("b"));

    {
        let _inner = CTX.enter(Overrides::new().set("a", 2))?;
        assert_eq!(CTX.current().a, Some(2));
        assert_eq!(CTX.current().b.as_deref(), Some("b"));
    }

    assert_eq!(CTX.current().a, Some(1));
    drop(outer);
    assert_eq!(CTX.current(), Ctx::default());
    Ok(())
}

#[test]
fn direct_write_rejected_and_value_unchanged() {
    static CTX: TypedContext<Ctx> = TypedContext::new("record_readonly");

    let err = CTX.assign("a", json!(7)).unwrap_err();
    assert!(err.is_read_only_violation());
    assert_eq!(CTX.current().a, None);
}

#[test]
fn nested_path_override_shadows_and_restores() -> Result<()> {
    static CTX: MapContext = MapContext::new("map_nested_path");

    let _outer = CTX.enter(Overrides::new().set("a", json!({"b": 1})))?;
    {
        let _inner = CTX.enter(Overrides::new().set("a__b", 2))?;
        assert_eq!(CTX.get("a")?["b"], json!(2));
    }
    assert_eq!(CTX.get("a")?["b"], json!(1));
    Ok(())
}

#[test]
fn tombstone_removes_key_until_scope_exits() -> Result<()> {
    static CTX: MapContext = MapContext::new("map_tombstone");

    let _outer = CTX.enter(Overrides::new().set("a", 1).set("b", 2))?;
    {
        let _inner = CTX.enter(Overrides::new().remove("b"))?;
        assert_eq!(CTX.get("a")?, json!(1));
        assert!(CTX.get("b").unwrap_err().is_key_not_found());
    }
    assert_eq!(CTX.get("b")?, json!(2));
    Ok(())
}

#[test]
fn two_record_contexts_never_interact() -> Result<()> {
    static FIRST: TypedContext<Ctx> = TypedContext::new("isolation_first");
    static SECOND: TypedContext<Ctx2> = TypedContext::new("isolation_second");

    let _one = FIRST.enter(Overrides::new().set("a", 1))?;
    assert_eq!(SECOND.current(), Ctx2::default());

    let _two = SECOND.enter(Overrides::new().set("c", 2))?;
    assert_eq!(FIRST.current().a, Some(1));
    assert_eq!(SECOND.current().c, Some(2));

    {
        let _three = FIRST.enter(Overrides::new().set("b", "b"))?;
        let _four = SECOND.enter(Overrides::new().set("c", 1))?;
        assert_eq!(FIRST.current().a, Some(1));
        assert_eq!(FIRST.current().b.as_deref(), Some("b"));
        assert_eq!(SECOND.current().c, Some(1));
        assert_eq!(SECOND.current().d, None);
    }

    assert_eq!(SECOND.current().c, Some(2));
    Ok(())
}

#[test]
fn scope_is_visible_down_the_call_chain() -> Result<()> {
    static CTX: TypedContext<Ctx> = TypedContext::new("call_chain");

    fn leaf() {
        assert_eq!(CTX.current().a, Some(1));
        assert_eq!(CTX.current().b.as_deref(), Some("b"));
    }

    fn middle() {
        leaf();
        let _nested = CTX
            .enter(Overrides::new().set("a", 2))
            .expect("overrides are valid");
        assert_eq!(CTX.current().a, Some(2));
        assert_eq!(CTX.current().b.as_deref(), Some("b"));
    }

    let _scope = CTX.enter(Overrides::new().set("a", 1).set("b", "b"))?;
    middle();
    // middle's nested scope exited with its guard.
    assert_eq!(CTX.current().a, Some(1));
    Ok(())
}

#[test]
fn with_runs_inside_scope_and_exits_after() -> Result<()> {
    static CTX: MapContext = MapContext::new("map_with");

    let observed = CTX.with(Overrides::new().set("a", 3), || {
        CTX.get("a").map(|v| v == json!(3))
    })??;
    assert!(observed);
    assert!(CTX.current_frame().is_none());
    Ok(())
}

#[test]
fn double_wrap_nests_scopes() -> Result<()> {
    static CTX: TypedContext<Ctx> = TypedContext::new("record_wrap");

    let inner = CTX.wrap(Overrides::new().set("b", "b"), |arg: i64| {
        let current = CTX.current();
        assert_eq!(current.a, Some(1));
        assert_eq!(current.b.as_deref(), Some("b"));
        Ok(arg * 2)
    });
    let outer = CTX.wrap(Overrides::new().set("a", 1), |arg: i64| inner.call(arg));

    assert_eq!(outer.call(21)?, 42);
    // Both scopes exited with the call.
    assert_eq!(CTX.current(), Ctx::default());
    Ok(())
}

#[test]
fn enter_failure_surfaces_before_any_push() {
    static CTX: MapContext = MapContext::new("map_bad_path");

    let err = CTX
        .enter(Overrides::new().set("missing__leaf", 1))
        .unwrap_err();
    assert!(matches!(err, ContextError::Path(_)));
    assert_eq!(CTX.depth(), 0);
}

#[test]
fn out_of_order_guard_drop_closes_the_whole_region() -> Result<()> {
    static CTX: MapContext = MapContext::new("map_out_of_order");

    let outer = CTX.enter(Overrides::new().set("a", 1))?;
    let inner = CTX.enter(Overrides::new().set("a", 2))?;
    assert_eq!(CTX.get("a")?, json!(2));

    // Dropping the outer guard first ends its region, the nested scope
    // included; the outer value must not resurface under a live inner guard.
    drop(outer);
    assert!(CTX.get("a").unwrap_err().is_key_not_found());
    assert_eq!(CTX.depth(), 0);

    // The inner guard's own drop finds its scope already closed.
    drop(inner);
    assert_eq!(CTX.depth(), 0);
    assert!(CTX.current_frame().is_none());
    Ok(())
}

#[test]
fn reentry_depth_tracks_nesting() -> Result<()> {
    static CTX: MapContext = MapContext::new("map_depth");

    assert_eq!(CTX.depth(), 0);
    let _a = CTX.enter(Overrides::new().set("x", 1))?;
    assert_eq!(CTX.depth(), 1);
    {
        let _b = CTX.enter(Overrides::new())?;
        assert_eq!(CTX.depth(), 2);
    }
    assert_eq!(CTX.depth(), 1);
    Ok(())
}
