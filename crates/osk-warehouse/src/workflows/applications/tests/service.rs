use super::common::*;
use crate::workflows::applications::domain::{
    ApplicationAction, ApplicationId, ApplicationStatus, ApplicationType, WarehouseId,
};
use crate::workflows::applications::repository::ListQuery;
use crate::workflows::applications::{ErrorKind, RuleViolation, WorkflowError};

#[test]
fn create_stores_pending_application_with_catalog_lines() {
    let workflow = build_workflow();

    let submission = workflow
        .create(
            ApplicationId::new("tok-1"),
            request(
                ApplicationType::Send,
                Some("north"),
                None,
                &[("bolt", 3), ("washer", 2)],
            ),
            &alice().id,
        )
        .expect("create succeeds");

    assert!(!submission.replayed);
    let hydrated = submission.application;
    assert_eq!(hydrated.application.id, ApplicationId::new("tok-1"));
    assert_eq!(hydrated.application.status, ApplicationStatus::Pending);
    assert_eq!(hydrated.application.created_by_id, alice().id);
    assert_eq!(hydrated.application.finished_by_id, None);

    let bolt = &hydrated.items[0];
    assert_eq!(bolt.item_id.as_str(), "bolt");
    assert_eq!(bolt.count, 3);
    assert_eq!(bolt.item.as_ref().map(|item| item.name.as_str()), Some("M8 bolt"));
    let washer = &hydrated.items[1];
    assert_eq!(washer.item_id.as_str(), "washer");
    assert!(washer.item.is_none(), "uncatalogued items still transfer");
}

#[test]
fn create_with_same_token_and_request_is_a_replay() {
    let workflow = build_workflow();
    let submitted = request(ApplicationType::Receive, None, Some("north"), &[("bolt", 4)]);

    let first = workflow
        .create(ApplicationId::new("tok-1"), submitted.clone(), &alice().id)
        .expect("first create");
    let second = workflow
        .create(ApplicationId::new("tok-1"), submitted, &alice().id)
        .expect("retry succeeds");

    assert!(second.replayed);
    assert_eq!(second.application, first.application);

    let listed = workflow
        .list(&ListQuery {
            limit: 10,
            ..ListQuery::default()
        })
        .expect("list");
    assert_eq!(listed.items.len(), 1);
}

#[test]
fn create_with_reused_token_and_different_request_conflicts() {
    let workflow = build_workflow();
    submit(
        &workflow,
        "tok-1",
        request(ApplicationType::Receive, None, Some("north"), &[("bolt", 4)]),
        &alice(),
    );

    let err = workflow
        .create(
            ApplicationId::new("tok-1"),
            request(ApplicationType::Receive, None, Some("north"), &[("bolt", 5)]),
            &alice().id,
        )
        .expect_err("different payload under same token");
    assert!(matches!(err, WorkflowError::TokenReused(ref id) if id.as_str() == "tok-1"));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = workflow
        .create(
            ApplicationId::new("tok-1"),
            request(ApplicationType::Receive, None, Some("north"), &[("bolt", 4)]),
            &bob().id,
        )
        .expect_err("different creator under same token");
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn create_rejects_unresolvable_references() {
    let workflow = build_workflow();

    let err = workflow
        .create(
            ApplicationId::new("tok-1"),
            request(ApplicationType::Receive, None, Some("north"), &[("bolt", 1)]),
            &user("mallory"),
        )
        .expect_err("unknown actor");
    assert_eq!(
        err.to_string(),
        "cannot create an application on behalf of this user"
    );

    let err = workflow
        .create(
            ApplicationId::new("tok-2"),
            request(ApplicationType::Receive, None, Some("east"), &[("bolt", 1)]),
            &alice().id,
        )
        .expect_err("unknown destination");
    assert_eq!(err.to_string(), "destination warehouse does not exist");
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = workflow
        .create(
            ApplicationId::new("tok-3"),
            request(ApplicationType::Send, Some("east"), None, &[("bolt", 1)]),
            &alice().id,
        )
        .expect_err("unknown source");
    assert_eq!(err.to_string(), "source warehouse does not exist");

    let mut linked = request(ApplicationType::Revert, None, Some("north"), &[("bolt", 1)]);
    linked.linked_to_application_id = Some(ApplicationId::new("never-created"));
    let err = workflow
        .create(ApplicationId::new("tok-4"), linked, &alice().id)
        .expect_err("unknown linked application");
    assert!(matches!(
        err,
        WorkflowError::BadRequest(RuleViolation::UnknownLinkedApplication(_))
    ));
}

#[test]
fn create_rejects_empty_or_zero_payloads() {
    let workflow = build_workflow();

    let err = workflow
        .create(
            ApplicationId::new("tok-1"),
            request(ApplicationType::Receive, None, Some("north"), &[]),
            &alice().id,
        )
        .expect_err("empty payload");
    assert!(matches!(
        err,
        WorkflowError::BadRequest(RuleViolation::EmptyPayload)
    ));

    let err = workflow
        .create(
            ApplicationId::new("tok-2"),
            request(
                ApplicationType::Receive,
                None,
                Some("north"),
                &[("bolt", 2), ("nut", 0)],
            ),
            &alice().id,
        )
        .expect_err("zero count");
    assert!(matches!(
        err,
        WorkflowError::BadRequest(RuleViolation::ZeroQuantity(ref item)) if item.as_str() == "nut"
    ));
}

#[test]
fn linked_application_must_exist() {
    let workflow = build_workflow();
    let original = submit(
        &workflow,
        "use-1",
        request(ApplicationType::Use, Some("north"), Some("south"), &[("bolt", 1)]),
        &alice(),
    );

    let mut revert = request(ApplicationType::Revert, Some("south"), Some("north"), &[("bolt", 1)]);
    revert.linked_to_application_id = Some(original.id.clone());
    let stored = submit(&workflow, "revert-1", revert, &alice());
    assert_eq!(stored.linked_to_application_id, Some(original.id));
}

#[test]
fn draining_a_warehouse_blocks_the_next_deduction() {
    let workflow = build_workflow();
    stock_up(&workflow, "north", &[("bolt", 10)]);

    let a = submit(
        &workflow,
        "a",
        request(ApplicationType::Send, Some("north"), None, &[("bolt", 10)]),
        &alice(),
    );
    let approved = workflow.approve(&a.id, &rita()).expect("A approved");
    assert_eq!(approved.application.status, ApplicationStatus::Success);
    assert_eq!(approved.application.finished_by_id, Some(rita().id));
    assert_eq!(balance(&workflow, "north", "bolt"), 0);

    let b = submit(
        &workflow,
        "b",
        request(ApplicationType::Send, Some("north"), None, &[("bolt", 1)]),
        &alice(),
    );
    let err = workflow.approve(&b.id, &rita()).expect_err("B overdraws");
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(err
        .to_string()
        .starts_with("cannot deduct more than available"));
    assert_eq!(balance(&workflow, "north", "bolt"), 0);

    let b = workflow.get(&b.id, &rita()).expect("B still readable");
    assert_eq!(b.application.application.status, ApplicationStatus::Pending);
    assert_eq!(b.application.application.finished_by_id, None);
}

#[test]
fn receiving_creates_missing_rows() {
    let workflow = build_workflow();
    stock_up(&workflow, "south", &[("gear", 2)]);
    assert_eq!(balance(&workflow, "south", "gear"), 2);

    let c = submit(
        &workflow,
        "c",
        request(ApplicationType::Receive, None, Some("south"), &[("gear", 5)]),
        &alice(),
    );
    workflow.approve(&c.id, &rita()).expect("C approved");
    assert_eq!(balance(&workflow, "south", "gear"), 7);
}

#[test]
fn multi_line_deduction_is_all_or_nothing() {
    let workflow = build_workflow();
    stock_up(&workflow, "north", &[("bolt", 5), ("nut", 1)]);

    let greedy = submit(
        &workflow,
        "greedy",
        request(
            ApplicationType::Send,
            Some("north"),
            None,
            &[("bolt", 2), ("nut", 3)],
        ),
        &alice(),
    );
    let err = workflow
        .approve(&greedy.id, &rita())
        .expect_err("nut is short");
    assert!(err.to_string().contains("nut (requested 3, available 1)"));
    assert_eq!(balance(&workflow, "north", "bolt"), 5);
    assert_eq!(balance(&workflow, "north", "nut"), 1);
}

#[test]
fn send_between_warehouses_only_deducts_the_source() {
    let workflow = build_workflow();
    stock_up(&workflow, "north", &[("bolt", 6)]);

    let send = submit(
        &workflow,
        "send",
        request(
            ApplicationType::Send,
            Some("north"),
            Some("south"),
            &[("bolt", 4)],
        ),
        &alice(),
    );
    workflow.approve(&send.id, &sam()).expect("superuser approves");

    assert_eq!(balance(&workflow, "north", "bolt"), 2);
    assert_eq!(balance(&workflow, "south", "bolt"), 0);
}

#[test]
fn record_keeping_types_leave_the_ledger_alone() {
    let workflow = build_workflow();
    stock_up(&workflow, "north", &[("bolt", 3)]);

    let defect = submit(
        &workflow,
        "defect",
        request(
            ApplicationType::Defect,
            Some("north"),
            Some("south"),
            &[("bolt", 100)],
        ),
        &alice(),
    );
    workflow.approve(&defect.id, &rita()).expect("no-op approval");

    assert_eq!(balance(&workflow, "north", "bolt"), 3);
    assert_eq!(balance(&workflow, "south", "bolt"), 0);
}

#[test]
fn only_reviewers_resolve_applications() {
    let workflow = build_workflow();
    let pending = submit(
        &workflow,
        "p",
        request(ApplicationType::Receive, None, Some("north"), &[("bolt", 1)]),
        &alice(),
    );

    for result in [
        workflow.approve(&pending.id, &alice()),
        workflow.reject(&pending.id, &bob()),
    ] {
        let err = result.expect_err("plain users cannot resolve");
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    let err = workflow
        .approve(&ApplicationId::new("missing"), &rita())
        .expect_err("unknown id");
    assert!(matches!(err, WorkflowError::NotFound(_)));
    assert_eq!(balance(&workflow, "north", "bolt"), 0);
}

#[test]
fn terminal_applications_are_immutable() {
    let workflow = build_workflow();
    let rejected = submit(
        &workflow,
        "r",
        request(ApplicationType::Receive, None, Some("north"), &[("bolt", 1)]),
        &alice(),
    );
    let done = workflow.reject(&rejected.id, &rita()).expect("rejected");
    assert_eq!(done.application.status, ApplicationStatus::Rejected);
    assert_eq!(done.application.finished_by_id, Some(rita().id));

    let approve = workflow.approve(&rejected.id, &rita()).expect_err("terminal");
    assert_eq!(approve.to_string(), "only pending applications may be approved");
    let reject = workflow.reject(&rejected.id, &sam()).expect_err("terminal");
    assert_eq!(reject.to_string(), "only pending applications may be rejected");
    let delete = workflow.delete(&rejected.id, &alice()).expect_err("terminal");
    assert!(delete.is_not_pending());
    let edit = workflow
        .update(
            &rejected.id,
            request(ApplicationType::Receive, None, Some("north"), &[("bolt", 2)]),
            &alice(),
        )
        .expect_err("terminal");
    assert!(edit.is_not_pending());

    let view = workflow.get(&rejected.id, &rita()).expect("readable");
    assert_eq!(view.application.application.status, ApplicationStatus::Rejected);
    assert_eq!(balance(&workflow, "north", "bolt"), 0);
}

#[test]
fn only_the_creator_may_delete() {
    let workflow = build_workflow();
    let pending = submit(
        &workflow,
        "d",
        request(ApplicationType::Receive, None, Some("north"), &[("bolt", 1)]),
        &alice(),
    );

    for intruder in [bob(), rita()] {
        let err = workflow
            .delete(&pending.id, &intruder)
            .expect_err("not the creator");
        assert_eq!(err.to_string(), "only the creator may delete");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    let deleted = workflow.delete(&pending.id, &alice()).expect("creator deletes");
    assert_eq!(deleted.application.status, ApplicationStatus::Deleted);
    assert_eq!(deleted.application.finished_by_id, Some(alice().id));

    let err = workflow
        .approve(&pending.id, &rita())
        .expect_err("deleted is terminal");
    assert!(err.is_not_pending());
}

#[test]
fn creator_edits_pending_application() {
    let workflow = build_workflow();
    let original = submit(
        &workflow,
        "e",
        request(ApplicationType::Send, Some("north"), None, &[("bolt", 1)]),
        &alice(),
    );

    let mut replacement = request(ApplicationType::Receive, None, Some("south"), &[("nut", 8)]);
    replacement.name = "Corrected".to_string();
    replacement.description = "wrong direction".to_string();

    let err = workflow
        .update(&original.id, replacement.clone(), &bob())
        .expect_err("bob did not create it");
    assert_eq!(err.to_string(), "only the creator may edit");

    let mut invalid = replacement.clone();
    invalid.sent_to_warehouse_id = Some(WarehouseId::new("east"));
    let err = workflow
        .update(&original.id, invalid, &alice())
        .expect_err("edit re-validates");
    assert_eq!(err.to_string(), "destination warehouse does not exist");

    let edited = workflow
        .update(&original.id, replacement, &alice())
        .expect("creator edits");
    let edited = edited.application;
    assert_eq!(edited.name, "Corrected");
    assert_eq!(edited.kind, ApplicationType::Receive);
    assert_eq!(edited.status, ApplicationStatus::Pending);
    assert_eq!(edited.serial_number, original.serial_number);
    assert_eq!(edited.created_at, original.created_at);
    assert!(edited.updated_at >= original.updated_at);

    workflow.approve(&original.id, &rita()).expect("approve edit");
    assert_eq!(balance(&workflow, "south", "nut"), 8);
}

#[test]
fn get_offers_actions_the_state_machine_accepts() {
    let workflow = build_workflow();
    let pending = submit(
        &workflow,
        "g",
        request(ApplicationType::Receive, None, Some("north"), &[("bolt", 1)]),
        &alice(),
    );

    let for_reviewer = workflow.get(&pending.id, &rita()).expect("get");
    assert_eq!(
        for_reviewer.actions,
        vec![ApplicationAction::Approve, ApplicationAction::Reject]
    );
    let for_creator = workflow.get(&pending.id, &alice()).expect("get");
    assert_eq!(
        for_creator.actions,
        vec![ApplicationAction::Edit, ApplicationAction::Delete]
    );
    assert!(workflow.get(&pending.id, &bob()).expect("get").actions.is_empty());

    workflow.approve(&pending.id, &rita()).expect("approved");
    assert!(workflow.get(&pending.id, &rita()).expect("get").actions.is_empty());

    let err = workflow
        .get(&ApplicationId::new("missing"), &rita())
        .expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn list_pages_and_validates_limit() {
    let workflow = build_workflow();
    for index in 0..3 {
        submit(
            &workflow,
            &format!("l-{index}"),
            request(ApplicationType::Receive, None, Some("north"), &[("bolt", 1)]),
            &alice(),
        );
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    workflow
        .reject(&ApplicationId::new("l-1"), &rita())
        .expect("rejected");

    let first = workflow
        .list(&ListQuery {
            limit: 2,
            ..ListQuery::default()
        })
        .expect("first page");
    let ids: Vec<_> = first.items.iter().map(|a| a.application.id.as_str()).collect();
    assert_eq!(ids, vec!["l-2", "l-1"]);

    let rest = workflow
        .list(&ListQuery {
            limit: 2,
            cursor: first.cursor,
            ..ListQuery::default()
        })
        .expect("second page");
    let ids: Vec<_> = rest.items.iter().map(|a| a.application.id.as_str()).collect();
    assert_eq!(ids, vec!["l-0"]);
    assert!(rest.cursor.is_none());

    let pending = workflow
        .list(&ListQuery {
            status: Some(ApplicationStatus::Pending),
            limit: 10,
            ..ListQuery::default()
        })
        .expect("pending");
    assert_eq!(pending.items.len(), 2);

    let mine = workflow
        .list(&ListQuery {
            chained_to_user: Some(rita().id),
            limit: 10,
            ..ListQuery::default()
        })
        .expect("rita's");
    assert_eq!(mine.items.len(), 1);

    for limit in [0, 11] {
        let err = workflow
            .list(&ListQuery {
                limit,
                ..ListQuery::default()
            })
            .expect_err("limit out of range");
        assert!(matches!(
            err,
            WorkflowError::BadRequest(RuleViolation::InvalidPageSize { max: 10, .. })
        ));
    }
}

#[test]
fn stock_lists_positive_rows_for_known_warehouses() {
    let workflow = build_workflow();
    stock_up(&workflow, "north", &[("bolt", 2), ("nut", 1)]);
    let drain = submit(
        &workflow,
        "drain",
        request(ApplicationType::Send, Some("north"), None, &[("nut", 1)]),
        &alice(),
    );
    workflow.approve(&drain.id, &rita()).expect("drained");

    let stock = workflow
        .stock(&WarehouseId::new("north"))
        .expect("known warehouse");
    assert_eq!(stock.warehouse.name, "North depot");
    assert_eq!(stock.items.len(), 1);
    assert_eq!(stock.items[0].item_id.as_str(), "bolt");
    assert_eq!(stock.items[0].count, 2);

    let err = workflow
        .stock(&WarehouseId::new("east"))
        .expect_err("unknown warehouse");
    assert!(matches!(err, WorkflowError::WarehouseNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
