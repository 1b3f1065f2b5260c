mod common;

use common::{admin, broker, join, open_deal, party, service};
use dealroom_service::{IdentityRef, LinkChange, ResolveMode, Resolution};
use dealroom_types::{
    AuditAction, DealroomError, IdentityCandidate, IdentityUpdate, InvitationStatus,
    PermissionOverrides, Role,
};

#[tokio::test]
async fn test_resolve_is_idempotent_across_casing() {
    let service = service();
    let staff = broker();

    let first = service
        .resolve_or_create_identity(&staff, &IdentityCandidate::new("Ann", "A@B.com"), ResolveMode::UseExisting)
        .await
        .unwrap();
    let second = service
        .resolve_or_create_identity(&staff, &IdentityCandidate::new("Ann B", " a@b.com "), ResolveMode::UseExisting)
        .await
        .unwrap();

    assert!(matches!(first, Resolution::Created { .. }));
    assert!(matches!(second, Resolution::Resolved { .. }));
    assert_eq!(first.identity().unwrap().id, second.identity().unwrap().id);
    assert_eq!(second.identity().unwrap().name, "Ann");
    assert_eq!(service.search_identities(&staff, "a@b.com").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_requires_force() {
    let service = service();
    let staff = broker();
    let original = service
        .create_identity(&staff, &IdentityCandidate::new("Ann", "ann@x.io"), false)
        .await
        .unwrap();

    let err = service
        .create_identity(&staff, &IdentityCandidate::new("Ann Two", "ANN@x.io"), false)
        .await
        .unwrap_err();
    match err {
        DealroomError::DuplicateIdentity { existing } => assert_eq!(existing.id, original.id),
        other => panic!("expected DuplicateIdentity, got {other:?}"),
    }

    let confirm = service
        .resolve_or_create_identity(&staff, &IdentityCandidate::new("Ann", "ann@x.io "), ResolveMode::Confirm)
        .await
        .unwrap();
    assert!(matches!(confirm, Resolution::NeedsDecision { ref existing } if existing.id == original.id));

    let forced = service
        .create_identity(&staff, &IdentityCandidate::new("Ann Two", "ANN@x.io"), true)
        .await
        .unwrap();
    assert_ne!(forced.id, original.id);
    assert_eq!(forced.duplicate_of.as_ref(), Some(&original.id));
    assert_eq!(service.search_identities(&staff, "ann").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_add_participant_reuses_directory_entry() {
    let service = service();
    let deal = open_deal(&service).await;
    let ann = join(&service, &deal, "Ann", "ann@x.io", Role::Buyer).await;

    let again = service
        .add_participant(
            &broker(),
            &deal.id,
            IdentityRef::Candidate(IdentityCandidate::new("Annie", "  Ann@X.io")),
            Role::Buyer,
            &PermissionOverrides::default(),
        )
        .await
        .unwrap();
    assert_eq!(again.change, LinkChange::Unchanged);
    assert!(!again.identity_created);
    assert_eq!(again.identity.id, ann.id);
    assert_eq!(service.roster(&broker(), &deal.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remove_then_readd_reactivates_same_link() {
    let service = service();
    let deal = open_deal(&service).await;
    let ann = join(&service, &deal, "Ann", "ann@x.io", Role::Buyer).await;

    let removed = service
        .remove_participant(&broker(), &deal.id, &ann.id)
        .await
        .unwrap();
    assert!(!removed.is_active);
    assert!(service.roster(&broker(), &deal.id).await.unwrap().is_empty());

    let back = service
        .add_participant(&broker(), &deal.id, IdentityRef::Id(ann.id.clone()), Role::Seller, &PermissionOverrides::default())
        .await
        .unwrap();
    assert_eq!(back.change, LinkChange::Reactivated);
    assert_eq!(back.participation.id, removed.id);
    assert_eq!(back.participation.role, Role::Seller);

    let trail = service.audit_trail(&common::lawyer(), &deal.id).await.unwrap();
    let actions: Vec<_> = trail.iter().map(|e| e.action).collect();
    assert!(actions.contains(&AuditAction::ParticipantRemoved));
    assert!(actions.contains(&AuditAction::ParticipantReactivated));
}

#[tokio::test]
async fn test_identity_edit_fans_out_to_roster() {
    let service = service();
    let deal = open_deal(&service).await;
    let ann = join(&service, &deal, "Ann", "ann@x.io", Role::Buyer).await;

    service
        .update_identity(
            &broker(),
            &ann.id,
            &IdentityUpdate {
                name: Some("Ann Smith".into()),
                email: Some("Ann.Smith@X.io".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let roster = service.roster(&broker(), &deal.id).await.unwrap();
    assert_eq!(roster[0].identity.name, "Ann Smith");
    assert_eq!(roster[0].identity.email.as_str(), "ann.smith@x.io");
}

#[tokio::test]
async fn test_delete_identity_is_admin_only_and_cascades() {
    let service = service();
    let deal = open_deal(&service).await;
    let ann = join(&service, &deal, "Ann", "ann@x.io", Role::Buyer).await;

    let err = service.delete_identity(&broker(), &ann.id).await.unwrap_err();
    assert!(matches!(err, DealroomError::PermissionDenied { .. }));

    let deleted = service.delete_identity(&admin(), &ann.id).await.unwrap();
    assert_eq!(deleted.removed_links.len(), 1);
    assert!(service.roster(&broker(), &deal.id).await.unwrap().is_empty());

    let trail = service.audit_trail(&admin(), &deal.id).await.unwrap();
    assert!(trail.iter().any(|e| e.action == AuditAction::ParticipantRemoved));
}

#[tokio::test]
async fn test_invitee_answers_own_invitation() {
    let service = service();
    let deal = open_deal(&service).await;
    let ann = join(&service, &deal, "Ann", "ann@x.io", Role::Buyer).await;
    let bob = join(&service, &deal, "Bob", "bob@x.io", Role::Seller).await;

    let ann_session = party("user-ann", Role::Buyer, "ANN@x.io");
    let accepted = service
        .set_invitation_status(&ann_session, &ann.id, InvitationStatus::Accepted)
        .await
        .unwrap();
    assert_eq!(accepted.invitation_status, InvitationStatus::Accepted);

    let err = service
        .set_invitation_status(&ann_session, &bob.id, InvitationStatus::Declined)
        .await
        .unwrap_err();
    assert!(matches!(err, DealroomError::PermissionDenied { .. }));
}

#[tokio::test]
async fn test_participants_cannot_manage_directory() {
    let service = service();
    let buyer = party("user-ann", Role::Buyer, "ann@x.io");
    let err = service
        .create_identity(&buyer, &IdentityCandidate::new("Eve", "eve@x.io"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, DealroomError::PermissionDenied { .. }));
}
