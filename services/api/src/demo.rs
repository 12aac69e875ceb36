use crate::infra::{build_workflow, bundled_directory};
use clap::Args;
use osk_warehouse::config::{AppConfig, WorkflowConfig};
use osk_warehouse::error::AppError;
use osk_warehouse::store::Store;
use osk_warehouse::workflows::applications::{
    ApplicationId, ApplicationRequest, ApplicationType, ApplicationWorkflow, HydratedApplication,
    ItemId, Payload, UserId, WarehouseId, WarehouseStock,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Units of the demo item received into the first warehouse before the transfers run.
    #[arg(long, default_value_t = 10)]
    pub(crate) seed: u64,
    /// Print the final stock of both warehouses as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct StockArgs {
    /// Warehouse id as known to the directory
    pub(crate) warehouse: String,
    /// Print the stock as JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_stock_report(args: StockArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let workflow = build_workflow(&config)?;
    let stock = workflow.stock(&WarehouseId::new(args.warehouse))?;

    if args.json {
        print_json(&stock);
    } else {
        render_stock(&stock);
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { seed, json } = args;

    let directory = bundled_directory()?;
    let creator = directory.require_user(&UserId::new("casey"))?;
    let reviewer = directory.require_user(&UserId::new("riley"))?;

    let workflow = ApplicationWorkflow::new(
        Arc::new(Store::temporary()?),
        Arc::new(directory),
        WorkflowConfig::default(),
    );

    println!("Warehouse application demo (scratch store)");

    let receipt = workflow.create(
        ApplicationId::new("demo-seed"),
        demo_request(ApplicationType::Receive, None, Some("W"), "X", seed),
        &creator.id,
    )?;
    workflow.approve(&receipt.application.application.id, &reviewer)?;
    println!("  Seeded {seed} x X into W");

    let drain = workflow.create(
        ApplicationId::new("demo-a"),
        demo_request(ApplicationType::Send, Some("W"), None, "X", seed),
        &creator.id,
    )?;
    let drained = workflow.approve(&drain.application.application.id, &reviewer)?;
    render_application("A", &drained);

    let overdraw = workflow.create(
        ApplicationId::new("demo-b"),
        demo_request(ApplicationType::Send, Some("W"), None, "X", 1),
        &creator.id,
    )?;
    match workflow.approve(&overdraw.application.application.id, &reviewer) {
        Ok(application) => render_application("B", &application),
        Err(err) => println!("  B refused: {err}"),
    }
    let still_pending = workflow.get(&overdraw.application.application.id, &reviewer)?;
    println!(
        "  B status after refusal: {}",
        still_pending.application.application.status
    );

    let inbound = workflow.create(
        ApplicationId::new("demo-c"),
        demo_request(ApplicationType::Receive, None, Some("W2"), "Y", 5),
        &creator.id,
    )?;
    let received = workflow.approve(&inbound.application.application.id, &reviewer)?;
    render_application("C", &received);

    for warehouse in ["W", "W2"] {
        let stock = workflow.stock(&WarehouseId::new(warehouse))?;
        if json {
            print_json(&stock);
        } else {
            render_stock(&stock);
        }
    }

    Ok(())
}

fn demo_request(
    kind: ApplicationType,
    from: Option<&str>,
    to: Option<&str>,
    item: &str,
    count: u64,
) -> ApplicationRequest {
    let mut payload = Payload::new();
    payload.insert(ItemId::new(item), count);
    ApplicationRequest {
        name: format!("{} {count} x {item}", kind.label()),
        description: "demo".to_string(),
        kind,
        payload,
        sent_from_warehouse_id: from.map(WarehouseId::new),
        sent_to_warehouse_id: to.map(WarehouseId::new),
        linked_to_application_id: None,
    }
}

fn render_application(label: &str, hydrated: &HydratedApplication) {
    let application = &hydrated.application;
    println!(
        "  {label}: #{} {} ({}) -> {}",
        application.serial_number,
        application.name,
        application.kind.label(),
        application.status
    );
    for line in &hydrated.items {
        let name = line
            .item
            .as_ref()
            .map(|item| item.name.as_str())
            .unwrap_or("uncatalogued");
        println!("    - {} x {} ({name})", line.count, line.item_id);
    }
}

fn render_stock(stock: &WarehouseStock) {
    println!("\nStock of {} ({})", stock.warehouse.name, stock.warehouse.id);
    if stock.items.is_empty() {
        println!("  empty");
        return;
    }
    for line in &stock.items {
        let name = line
            .item
            .as_ref()
            .map(|item| item.name.as_str())
            .unwrap_or("uncatalogued");
        println!("  {:>6}  {:<12} {name}", line.count, line.item_id.as_str());
    }
}

fn print_json(stock: &WarehouseStock) {
    match serde_json::to_string_pretty(stock) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("stock unavailable as JSON: {err}"),
    }
}
