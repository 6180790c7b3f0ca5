use std::marker::PhantomData;

use annals::{Aggregate, Apply, DomainEvent};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, DomainEvent)]
pub struct ValueSet {
    pub value: i32,
}

#[derive(Default, Aggregate)]
#[aggregate(
    id = u64,
    error = String,
    events(ValueSet),
    identity = "key",
    event_enum = "RegisterChange"
)]
pub struct Register<T: Default> {
    key: Option<u64>,
    value: i32,
    marker: PhantomData<T>,
}

impl<T: Default> Apply<ValueSet> for Register<T> {
    fn apply(&mut self, event: &ValueSet) {
        self.value = event.value;
    }
}

fn main() {
    let _ = RegisterChange::ValueSet(ValueSet { value: 1 });
    assert_eq!(<Register<String> as Aggregate>::KIND, "register");
    assert!(Register::<String>::default().id().is_none());
}
