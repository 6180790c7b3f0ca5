use annals::{DomainEvent, event::EventType};

#[derive(DomainEvent)]
pub struct OrderCancelled;

#[derive(DomainEvent)]
#[event(kind = "order-shipped", ancestors("order-changed", "order-touched"))]
pub struct Shipped(pub String);

fn main() {
    assert_eq!(<OrderCancelled as DomainEvent>::KIND, "order-cancelled");
    assert!(<OrderCancelled as DomainEvent>::INTERFACES.is_empty());

    let shipped = Shipped("carrier".to_owned());
    let walk: Vec<_> = shipped.type_hierarchy().collect();
    assert_eq!(walk, ["order-shipped", "order-changed", "order-touched"]);
}
