use changetrack_core::{
    CHANGE_TRACKING_STATUS, ChangeStatus, ErrorCode, Object, TrackOptions, TrackingSession,
    Value, as_tracker, wrap,
};

#[path = "fixtures.rs"]
mod fixtures;
use fixtures::*;

#[test]
fn freshly_wrapped_graph_is_unchanged() {
    let trackable = wrap(&order(), TrackOptions::default());
    let tracker = as_tracker(&trackable);

    assert_eq!(tracker.status(), ChangeStatus::Unchanged);
    assert!(tracker.changed_properties().is_empty());
    assert!(!tracker.has_changes());
}

#[test]
fn writes_are_listed_in_declaration_order() {
    let trackable = wrap(&order(), TrackOptions::default());
    trackable.set("CustomerNumber", "C-9").expect("write");
    trackable.set("Id", 9).expect("write");

    assert_eq!(
        as_tracker(&trackable).changed_properties(),
        vec!["Id".to_string(), "CustomerNumber".to_string()]
    );
}

#[test]
fn original_value_survives_repeated_writes() {
    let trackable = wrap(&order(), TrackOptions::default());
    trackable.set("Id", 2).expect("write");
    trackable.set("Id", 3).expect("write");

    let tracker = as_tracker(&trackable);
    assert_eq!(tracker.original_value("Id"), Ok(Value::Int(1)));
    assert_eq!(tracker.original().get("Id"), Ok(Value::Int(1)));
    assert_eq!(trackable.get("Id"), Ok(Value::Int(3)));
}

#[test]
fn writing_back_the_original_still_counts_as_changed() {
    let trackable = wrap(&order(), TrackOptions::default());
    trackable.set("Id", 2).expect("write");
    trackable.set("Id", 1).expect("write back");

    let tracker = as_tracker(&trackable);
    assert_eq!(tracker.status(), ChangeStatus::Changed);
    assert_eq!(tracker.changed_properties(), vec!["Id".to_string()]);
}

#[test]
fn accept_makes_current_values_the_baseline() {
    let trackable = wrap(&order(), TrackOptions::default());
    trackable.set("CustomerNumber", "Accepted").expect("write");

    let tracker = as_tracker(&trackable);
    tracker.accept_changes();

    assert_eq!(tracker.status(), ChangeStatus::Unchanged);
    assert!(tracker.changed_properties().is_empty());
    assert_eq!(
        tracker.original_value("CustomerNumber"),
        Ok(Value::from("Accepted"))
    );

    tracker.reject_changes();
    assert_eq!(trackable.get("CustomerNumber"), Ok(Value::from("Accepted")));
}

#[test]
fn reject_restores_every_written_property() {
    let plain = order();
    let trackable = wrap(&plain, TrackOptions::default());
    trackable.set("Id", 50).expect("write");
    trackable.set("CustomerNumber", "Other").expect("write");
    trackable.set("Address", Value::Null).expect("write");

    let monitor = trackable.monitor();
    as_tracker(&trackable).reject_changes();

    assert_eq!(plain.get("Id"), Ok(Value::Int(1)));
    assert_eq!(plain.get("CustomerNumber"), Ok(Value::from("Customer1")));
    assert!(plain.get("Address").is_ok_and(|a| a.as_object().is_some()));
    assert!(monitor.raised("Id"));
    assert!(monitor.raised("CustomerNumber"));
    assert!(monitor.raised("Address"));
    assert_eq!(as_tracker(&trackable).status(), ChangeStatus::Unchanged);
}

#[test]
fn restored_child_relays_again() {
    let trackable = wrap(&order(), TrackOptions::default());
    let address = trackable
        .object("Address")
        .expect("complex")
        .expect("non-null");

    trackable.set("Address", Value::Null).expect("clear");
    as_tracker(&trackable).reject_changes();

    let monitor = trackable.monitor();
    address.set("City", "Tulsa").expect("write");
    assert!(monitor.raised("Address"));
}

#[test]
fn reject_reverts_a_child_detached_since_the_checkpoint() {
    let plain = order();
    let trackable = wrap(&plain, TrackOptions::default());
    let held = plain
        .get("Address")
        .ok()
        .and_then(|a| a.as_object().cloned())
        .expect("address");

    trackable
        .object("Address")
        .expect("complex")
        .expect("non-null")
        .set("City", "Dallas")
        .expect("write");
    trackable.set("Address", Value::Null).expect("clear");
    as_tracker(&trackable).reject_changes();

    assert_eq!(held.get("City"), Ok(Value::from("Chicago")));
    assert_eq!(as_tracker(&trackable).status(), ChangeStatus::Unchanged);
    let restored = trackable
        .object("Address")
        .expect("complex")
        .expect("non-null");
    assert_eq!(restored.tracker().status(), ChangeStatus::Unchanged);
}

#[test]
fn nested_change_marks_parent_changed() {
    let trackable = wrap(&order(), TrackOptions::default());
    let address = trackable
        .object("Address")
        .expect("complex")
        .expect("non-null");
    let monitor = trackable.monitor();

    address.set("City", "Dallas").expect("write");

    let tracker = as_tracker(&trackable);
    assert_eq!(tracker.status(), ChangeStatus::Changed);
    assert_eq!(tracker.changed_properties(), vec!["Address".to_string()]);
    assert!(monitor.raised(CHANGE_TRACKING_STATUS));
}

#[test]
fn parent_accept_clears_children() {
    let trackable = wrap(&order(), TrackOptions::default());
    let address = trackable
        .object("Address")
        .expect("complex")
        .expect("non-null");
    address.set("City", "Dallas").expect("write");
    let monitor = trackable.monitor();

    as_tracker(&trackable).accept_changes();

    assert_eq!(address.tracker().status(), ChangeStatus::Unchanged);
    assert_eq!(as_tracker(&trackable).status(), ChangeStatus::Unchanged);
    assert!(monitor.raised(CHANGE_TRACKING_STATUS));
}

#[test]
fn parent_reject_reverts_children() {
    let trackable = wrap(&order(), TrackOptions::default());
    let address = trackable
        .object("Address")
        .expect("complex")
        .expect("non-null");
    address.set("City", "Dallas").expect("write");
    let detail = trackable
        .list("OrderDetails")
        .expect("collection")
        .expect("non-null")
        .object(1)
        .expect("in range")
        .expect("object");
    detail.set("ItemNo", "changed").expect("write");

    as_tracker(&trackable).reject_changes();

    assert_eq!(address.get("City"), Ok(Value::from("Chicago")));
    assert_eq!(detail.get("ItemNo"), Ok(Value::from("54321")));
    assert_eq!(as_tracker(&trackable).status(), ChangeStatus::Unchanged);
}

#[test]
fn child_accept_leaves_parent_writes_pending() {
    let trackable = wrap(&order(), TrackOptions::default());
    let address = trackable
        .object("Address")
        .expect("complex")
        .expect("non-null");
    trackable.set("Id", 77).expect("write");
    address.set("City", "Reno").expect("write");

    address.tracker().accept_changes();

    let tracker = as_tracker(&trackable);
    assert_eq!(tracker.status(), ChangeStatus::Changed);
    assert_eq!(tracker.changed_properties(), vec!["Id".to_string()]);
}

#[test]
fn collection_changes_surface_on_the_owner() {
    let trackable = wrap(&order(), TrackOptions::default());
    let details = trackable
        .list("OrderDetails")
        .expect("collection")
        .expect("non-null");

    details.push(order_detail(3, "Item3")).expect("push");

    let tracker = as_tracker(&trackable);
    assert_eq!(tracker.status(), ChangeStatus::Changed);
    assert_eq!(tracker.changed_properties(), vec!["OrderDetails".to_string()]);

    tracker.reject_changes();
    assert_eq!(details.len(), 2);
    assert_eq!(tracker.status(), ChangeStatus::Unchanged);
}

#[test]
fn added_and_deleted_markers_need_a_collection_checkpoint() {
    let trackable = wrap(&order(), TrackOptions::default());
    let details = trackable
        .list("OrderDetails")
        .expect("collection")
        .expect("non-null");
    let fresh = order_detail(3, "Item3");
    details.push(&fresh).expect("push");
    let added = details.added_items().pop().expect("added");

    added.tracker().accept_changes();
    assert_eq!(added.tracker().status(), ChangeStatus::Added);

    details.accept_changes();
    assert_eq!(added.tracker().status(), ChangeStatus::Unchanged);
}

#[test]
fn wrapped_as_deleted_stays_deleted_after_writes() {
    let session = TrackingSession::new(TrackOptions::default());
    let trackable = session.wrap_as(&order(), ChangeStatus::Deleted);

    trackable.set("Id", 5).expect("write");
    let tracker = as_tracker(&trackable);
    assert_eq!(tracker.status(), ChangeStatus::Deleted);
    assert_eq!(tracker.changed_properties(), vec!["Id".to_string()]);
}

#[test]
fn cyclic_graph_accepts_and_rejects() {
    let (first, second) = linked_inventory_updates();
    let trackable = wrap(&first, TrackOptions::default());
    let linked = trackable
        .object("LinkedInventoryUpdate")
        .expect("complex")
        .expect("non-null");

    trackable.set("InventoryUpdateId", 10).expect("write");
    linked.set("InventoryUpdateId", 20).expect("write");
    assert_eq!(linked.tracker().status(), ChangeStatus::Changed);
    assert_eq!(
        linked.tracker().changed_properties(),
        vec![
            "InventoryUpdateId".to_string(),
            "LinkedToInventoryUpdate".to_string()
        ]
    );

    as_tracker(&trackable).reject_changes();
    assert_eq!(first.get("InventoryUpdateId"), Ok(Value::Int(1)));
    assert_eq!(second.get("InventoryUpdateId"), Ok(Value::Int(2)));
    assert_eq!(as_tracker(&trackable).status(), ChangeStatus::Unchanged);
    assert_eq!(linked.tracker().status(), ChangeStatus::Unchanged);
}

#[test]
fn failed_write_changes_nothing() {
    let plain = order();
    let trackable = wrap(&plain, TrackOptions::default());
    let monitor = trackable.monitor();

    let err = trackable
        .set("Address", order_detail(1, "x"))
        .expect_err("wrong shape");
    assert_eq!(err.code(), ErrorCode::TypeMismatch);
    let err = trackable.set("Nope", 1).expect_err("unknown");
    assert_eq!(err.code(), ErrorCode::PropertyNotFound);

    assert!(monitor.events().is_empty());
    assert_eq!(as_tracker(&trackable).status(), ChangeStatus::Unchanged);

    trackable.set("Id", 4).expect("graph still usable");
    assert_eq!(plain.get("Id"), Ok(Value::Int(4)));
}

#[test]
fn tracker_of_requires_a_wrapped_object() {
    let session = TrackingSession::new(TrackOptions::default());
    let plain = order();
    let _trackable = session.wrap(&plain);

    let held = plain
        .get("Address")
        .ok()
        .and_then(|a| a.as_object().cloned())
        .expect("address");
    assert!(session.tracker_of(&held).is_ok());

    let stranger: Object = address("Elsewhere");
    let err = session.tracker_of(&stranger).expect_err("never wrapped");
    assert_eq!(err.code(), ErrorCode::NotTrackable);
}

#[test]
fn shared_child_gets_one_proxy() {
    let shared = address("Shared");
    let first = order();
    let second = order();
    first.set("Address", &shared).expect("link");
    second.set("Address", &shared).expect("link");

    let session = TrackingSession::new(TrackOptions::default());
    let a = session.wrap(&first);
    let b = session.wrap(&second);
    let from_a = a.object("Address").expect("complex").expect("non-null");
    let from_b = b.object("Address").expect("complex").expect("non-null");
    assert!(from_a.ptr_eq(&from_b));

    let monitor_a = a.monitor();
    let monitor_b = b.monitor();
    from_a.set("City", "Both").expect("write");
    assert!(monitor_a.raised("Address"));
    assert!(monitor_b.raised("Address"));
}
