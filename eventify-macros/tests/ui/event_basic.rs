use eventify::event;
use eventify::event::{Event, EventHeader, TypedEvent};

#[event(type = "order.placed")]
struct OrderPlaced {
    order_id: String,
    amount: u64,
}

fn main() {
    let placed = OrderPlaced {
        header: EventHeader::with_id("o-1"),
        order_id: "o-1".to_string(),
        amount: 42,
    };

    assert_eq!(OrderPlaced::EVENT_TYPE, "order.placed");
    assert_eq!(placed.event_type(), "order.placed");
    assert_eq!(placed.event_id(), "o-1");
    assert!(placed.backend().is_none());

    let copy = placed.clone();
    assert_eq!(copy.amount, 42);
    assert_eq!(copy.order_id, "o-1");
}
