use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;

use crate::config::WorkflowConfig;
use crate::directory::StaticDirectory;
use crate::store::Store;
use crate::workflows::applications::domain::{
    Application, ApplicationId, ApplicationRequest, ApplicationType, Identity, ItemId, ItemInfo,
    Payload, Roles, UserId, WarehouseId, WarehouseInfo,
};
use crate::workflows::applications::{application_router, ApplicationWorkflow};

pub(super) type Workflow = ApplicationWorkflow<StaticDirectory>;

pub(super) fn alice() -> Identity {
    Identity::new("alice", Roles::default())
}

pub(super) fn bob() -> Identity {
    Identity::new("bob", Roles::default())
}

pub(super) fn rita() -> Identity {
    Identity::new(
        "rita",
        Roles {
            reviewer: true,
            ..Roles::default()
        },
    )
}

pub(super) fn sam() -> Identity {
    Identity::new(
        "sam",
        Roles {
            superuser: true,
            ..Roles::default()
        },
    )
}

pub(super) fn directory() -> StaticDirectory {
    StaticDirectory::default()
        .with_user(alice(), "alice-token")
        .with_user(bob(), "bob-token")
        .with_user(rita(), "rita-token")
        .with_user(sam(), "sam-token")
        .with_warehouse(WarehouseInfo {
            id: WarehouseId::new("north"),
            name: "North depot".to_string(),
            address: "1 Quay St".to_string(),
        })
        .with_warehouse(WarehouseInfo {
            id: WarehouseId::new("south"),
            name: "South depot".to_string(),
            address: "9 Mill Rd".to_string(),
        })
        .with_item(ItemInfo {
            id: ItemId::new("bolt"),
            name: "M8 bolt".to_string(),
            codes: vec!["4601234".to_string()],
        })
}

pub(super) fn build_workflow() -> Arc<Workflow> {
    let store = Arc::new(Store::temporary().expect("store opens"));
    Arc::new(ApplicationWorkflow::new(
        store,
        Arc::new(directory()),
        WorkflowConfig { max_page_size: 10 },
    ))
}

pub(super) fn payload(lines: &[(&str, u64)]) -> Payload {
    lines
        .iter()
        .map(|(item, count)| (ItemId::new(*item), *count))
        .collect()
}

pub(super) fn request(
    kind: ApplicationType,
    from: Option<&str>,
    to: Option<&str>,
    lines: &[(&str, u64)],
) -> ApplicationRequest {
    ApplicationRequest {
        name: format!("{} request", kind.label()),
        description: String::new(),
        kind,
        payload: payload(lines),
        sent_from_warehouse_id: from.map(WarehouseId::new),
        sent_to_warehouse_id: to.map(WarehouseId::new),
        linked_to_application_id: None,
    }
}

/// Creates a pending application as `actor` and returns the stored record.
pub(super) fn submit(
    workflow: &Workflow,
    token: &str,
    request: ApplicationRequest,
    actor: &Identity,
) -> Application {
    workflow
        .create(ApplicationId::new(token), request, &actor.id)
        .expect("create succeeds")
        .application
        .application
}

/// Puts stock on the shelf the only way the ledger allows: an approved receipt.
pub(super) fn stock_up(workflow: &Workflow, warehouse: &str, lines: &[(&str, u64)]) {
    static RECEIPTS: AtomicU64 = AtomicU64::new(1);
    let token = format!(
        "receipt-{warehouse}-{}",
        RECEIPTS.fetch_add(1, Ordering::Relaxed)
    );
    let receipt = submit(
        workflow,
        &token,
        request(ApplicationType::Receive, None, Some(warehouse), lines),
        &alice(),
    );
    workflow
        .approve(&receipt.id, &rita())
        .expect("receipt approved");
}

pub(super) fn balance(workflow: &Workflow, warehouse: &str, item: &str) -> u64 {
    workflow
        .ledger()
        .balance(&WarehouseId::new(warehouse), &ItemId::new(item))
        .expect("balance readable")
}

pub(super) fn user(id: &str) -> UserId {
    UserId::new(id)
}

pub(super) fn application_router_with(workflow: Arc<Workflow>) -> axum::Router {
    application_router(workflow)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
