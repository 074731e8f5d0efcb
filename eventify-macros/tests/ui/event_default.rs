use eventify::event;
use eventify::event::{Event, EventHeader, TypedEvent};
use serde::Serialize;

// 已有 header 字段与 derive 时保持原样
#[event]
#[derive(Serialize)]
struct Audited {
    header: EventHeader,
    actor: String,
}

fn main() {
    assert_eq!(Audited::EVENT_TYPE, "Audited");

    let audited = Audited {
        header: EventHeader::new(),
        actor: "alice".to_string(),
    };
    assert_eq!(audited.event_type(), "Audited");
    assert!(!audited.event_id().is_empty());
    assert_eq!(audited.actor, "alice");
}
