use annals::{Aggregate, Apply, DomainEvent, dispatch::ApplyHandlers, event::EventType};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, DomainEvent)]
#[event(interfaces("account-event"))]
pub struct AccountOpened {
    pub account_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, DomainEvent)]
#[event(kind = "deposit", interfaces("account-event"), ancestors("balance-changed"))]
pub struct FundsDeposited {
    pub amount: i64,
}

#[derive(Debug, Default, Aggregate)]
#[aggregate(
    id = String,
    error = String,
    events(AccountOpened, FundsDeposited),
    derives(Debug, PartialEq),
    register = Account::register_audit
)]
pub struct Account {
    id: Option<String>,
    balance: i64,
    touched: u32,
}

impl Account {
    fn register_audit(handlers: &mut ApplyHandlers<Self>) {
        handlers.on("account-event", |account, _event| account.touched += 1);
    }
}

impl Apply<AccountOpened> for Account {
    fn apply(&mut self, event: &AccountOpened) {
        self.id = Some(event.account_id.clone());
    }
}

impl Apply<FundsDeposited> for Account {
    fn apply(&mut self, event: &FundsDeposited) {
        self.balance += event.amount;
    }
}

fn main() {
    let event: AccountEvent = FundsDeposited { amount: 5 }.into();
    assert_eq!(event.kind(), "deposit");
    assert_eq!(event.interfaces(), ["account-event"]);
    assert_eq!(event.ancestors(), ["balance-changed"]);
    assert_eq!(<Account as Aggregate>::KIND, "account");

    let handlers = ApplyHandlers::<Account>::for_aggregate();
    assert!(handlers.contains("account-opened"));
    assert!(handlers.contains("deposit"));
    assert!(handlers.contains("account-event"));
}
