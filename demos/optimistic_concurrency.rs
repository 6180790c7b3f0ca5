//! Demonstrates optimistic concurrency control for concurrent writers.
//!
//! A `Context` checks pending events against anything committed since the
//! aggregate was loaded, and the store refuses appends whose expected version
//! is stale. This example walks through both checks and the retry helper.
//!
//! Run with: `cargo run --example optimistic_concurrency --features test-util`

use annals::{
    Aggregate, Apply, Context, DomainEvent, Handle, concurrency::Unchecked,
    context::SaveError, store::inmemory, test::ContextTestExt,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// Domain Events
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DomainEvent)]
#[event(kind = "inventory-item-registered")]
pub struct ItemRegistered {
    pub sku: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DomainEvent)]
#[event(kind = "inventory-item-reserved", interfaces("stock-changed"))]
pub struct ItemReserved {
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DomainEvent)]
#[event(kind = "inventory-item-restocked", interfaces("stock-changed"))]
pub struct ItemRestocked {
    pub quantity: u32,
}

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug)]
pub struct ReserveItem {
    pub quantity: u32,
}

#[derive(Debug)]
pub struct RestockItem {
    pub sku: String,
    pub quantity: u32,
}

// =============================================================================
// Aggregate
// =============================================================================

#[derive(Debug, Default, Aggregate)]
#[aggregate(
    id = String,
    error = InventoryError,
    events(ItemRegistered, ItemReserved, ItemRestocked),
    identity = "sku",
    derives(Debug, PartialEq, Eq),
    register = InventoryItem::register_stock_audit
)]
pub struct InventoryItem {
    sku: Option<String>,
    available: u32,
    stock_movements: u32,
}

impl InventoryItem {
    fn register_stock_audit(handlers: &mut annals::dispatch::ApplyHandlers<Self>) {
        handlers.on("stock-changed", |item, _event| item.stock_movements += 1);
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum InventoryError {
    #[error("item is not registered")]
    NotRegistered,
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },
}

impl Apply<ItemRegistered> for InventoryItem {
    fn apply(&mut self, event: &ItemRegistered) {
        self.sku = Some(event.sku.clone());
    }
}

impl Apply<ItemReserved> for InventoryItem {
    fn apply(&mut self, event: &ItemReserved) {
        self.available = self.available.saturating_sub(event.quantity);
    }
}

impl Apply<ItemRestocked> for InventoryItem {
    fn apply(&mut self, event: &ItemRestocked) {
        self.available += event.quantity;
    }
}

impl Handle<ReserveItem> for InventoryItem {
    fn handle(&self, cmd: &ReserveItem) -> Result<Vec<Self::Event>, Self::Error> {
        if self.sku.is_none() {
            return Err(InventoryError::NotRegistered);
        }
        if cmd.quantity > self.available {
            return Err(InventoryError::InsufficientStock {
                requested: cmd.quantity,
                available: self.available,
            });
        }
        Ok(vec![
            ItemReserved {
                quantity: cmd.quantity,
            }
            .into(),
        ])
    }
}

impl Handle<RestockItem> for InventoryItem {
    fn handle(&self, cmd: &RestockItem) -> Result<Vec<Self::Event>, Self::Error> {
        let mut events = Vec::with_capacity(2);
        if self.sku.is_none() {
            events.push(
                ItemRegistered {
                    sku: cmd.sku.clone(),
                }
                .into(),
            );
        }
        events.push(
            ItemRestocked {
                quantity: cmd.quantity,
            }
            .into(),
        );
        Ok(events)
    }
}

// =============================================================================
// Example Parts
// =============================================================================

type InventoryContext = Context<InventoryItem, inmemory::Store>;

/// Part 1: Basic usage.
///
/// Restocks an item and reserves from it with no concurrent writers.
async fn part1_basic_usage() -> Result<(InventoryContext, String), Box<dyn std::error::Error>> {
    println!("PART 1: Basic usage\n");

    let context: InventoryContext = Context::new(inmemory::Store::new());
    let sku = "SKU-001".to_string();

    println!("1. Restocking item with 100 units...");
    context
        .execute(
            &sku,
            &RestockItem {
                sku: sku.clone(),
                quantity: 100,
            },
        )
        .await?;

    let item = context.get(&sku, None).await?;
    println!(
        "   Available: {} (version {})\n",
        item.state().available,
        item.version()
    );

    println!("2. Reserving 30 units (no concurrent modification)...");
    context.execute(&sku, &ReserveItem { quantity: 30 }).await?;

    let item = context.get(&sku, None).await?;
    println!(
        "   Available: {} after {} stock movements\n",
        item.state().available,
        item.state().stock_movements
    );

    Ok((context, sku))
}

/// Part 2: Conflict detection.
///
/// Loads the item, lets another writer commit, then tries to save.
async fn part2_conflict_detection(
    context: &InventoryContext,
    sku: &String,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("PART 2: Conflict detection\n");

    let mut item = context.get(sku, None).await?;
    println!("3. Loaded item at version {}", item.version());

    println!("   Another process reserves 20 units...");
    context
        .inject_concurrent_event(sku, ItemReserved { quantity: 20 })
        .await?;

    item.handle(&ReserveItem { quantity: 10 })?;
    match context.save_and_publish_events(&mut item).await {
        Err(SaveError::Conflict(conflict)) => println!("   Rejected before writing: {conflict}\n"),
        Ok(()) => println!("   Unexpectedly saved!\n"),
        Err(e) => println!("   Error: {e}\n"),
    }

    println!("4. Reloading and reserving again...");
    let mut item = context.get(sku, None).await?;
    item.handle(&ReserveItem { quantity: 10 })?;
    context.save_and_publish_events(&mut item).await?;
    println!(
        "   Available: {} (version {})\n",
        item.state().available,
        item.version()
    );

    Ok(())
}

/// Part 3: The store's own version check.
///
/// Without a concurrency monitor, a stale save still fails at the store.
async fn part3_store_violation(context: InventoryContext) -> Result<(), Box<dyn std::error::Error>> {
    println!("PART 3: Store version check without a monitor\n");

    let sku = "SKU-001".to_string();
    let unchecked = context.with_monitor(Unchecked);

    let mut item = unchecked.get(&sku, None).await?;
    unchecked
        .inject_concurrent_event(&sku, ItemRestocked { quantity: 5 })
        .await?;

    item.handle(&ReserveItem { quantity: 1 })?;
    match unchecked.save_and_publish_events(&mut item).await {
        Err(SaveError::Violation(violation)) => println!("5. Store refused the write: {violation}\n"),
        Ok(()) => println!("5. Unexpectedly saved!\n"),
        Err(e) => println!("5. Error: {e}\n"),
    }

    Ok(())
}

/// Part 4: Retry and business rules.
///
/// `execute_with_retry` reloads on concurrency errors; rejections are
/// returned immediately.
async fn part4_retry_and_rules() -> Result<(), Box<dyn std::error::Error>> {
    println!("PART 4: Retry pattern and business rules\n");

    let context: InventoryContext = Context::new(inmemory::Store::new());
    let sku = "SKU-002".to_string();

    context
        .execute(
            &sku,
            &RestockItem {
                sku: sku.clone(),
                quantity: 50,
            },
        )
        .await?;
    context
        .inject_concurrent_event(&sku, ItemReserved { quantity: 5 })
        .await?;

    println!("6. Reserving 10 units with execute_with_retry...");
    let attempts = context
        .execute_with_retry(&sku, &ReserveItem { quantity: 10 }, 3)
        .await?;
    println!("   Succeeded on attempt {attempts}");

    let item = context.get(&sku, None).await?;
    println!(
        "   Final available: {} (50 - 5 - 10 = 35)\n",
        item.state().available
    );

    println!("7. Attempting to reserve 40 units (only 35 available)...");
    match context
        .execute_with_retry(&sku, &ReserveItem { quantity: 40 }, 3)
        .await
    {
        Err(annals::CommandError::Rejected(InventoryError::InsufficientStock {
            requested,
            available,
        })) => {
            println!("   Correctly rejected: requested {requested}, available {available}");
        }
        Ok(_) => println!("   Unexpectedly succeeded!"),
        Err(e) => println!("   Error: {e}"),
    }

    Ok(())
}

/// Print the summary of key takeaways.
fn print_summary() {
    println!("\n=== Example Complete ===");
    println!("\nKey takeaways:");
    println!("  1. The strict monitor rejects saves when events were committed after loading");
    println!("  2. The store rejects appends with a stale expected version");
    println!("  3. Use execute_with_retry() to reload and retry on either");
    println!("  4. Business rules are always evaluated against freshly loaded state");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Optimistic Concurrency Example ===\n");

    let (context, sku) = part1_basic_usage().await?;
    part2_conflict_detection(&context, &sku).await?;
    part3_store_violation(context).await?;
    part4_retry_and_rules().await?;

    print_summary();

    Ok(())
}
