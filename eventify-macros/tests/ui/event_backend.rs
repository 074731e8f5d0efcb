use eventify::dispatch::BackendKind;
use eventify::event;
use eventify::event::{Event, EventHeader};

#[event(type = "payment.captured", backend = "remote")]
struct PaymentCaptured {
    payment_id: String,
}

fn main() {
    let captured = PaymentCaptured {
        header: EventHeader::new(),
        payment_id: "p-9".to_string(),
    };
    assert_eq!(captured.backend(), Some(BackendKind::Remote));
    assert_eq!(captured.payment_id, "p-9");
}
