use annals::{Aggregate, Apply, DomainEvent};
use serde::{Deserialize, Serialize};

mod foo {
    use super::{Deserialize, DomainEvent, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize, DomainEvent)]
    #[event(kind = "foo-event")]
    pub struct Event;
}

mod bar {
    use super::{Deserialize, DomainEvent, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize, DomainEvent)]
    #[event(kind = "bar-event")]
    pub struct Event;
}

#[derive(Default, Aggregate)]
#[aggregate(id = String, error = String, events(foo::Event, bar::Event))]
pub struct Account {
    id: Option<String>,
}

impl Apply<foo::Event> for Account {
    fn apply(&mut self, _event: &foo::Event) {}
}

impl Apply<bar::Event> for Account {
    fn apply(&mut self, _event: &bar::Event) {}
}

fn assert_variant_names() {
    let _ = AccountEvent::FooEvent(foo::Event);
    let _ = AccountEvent::BarEvent(bar::Event);
}

fn main() {
    assert_variant_names();
}
