//! Document visibility and custody checks.
//!
//! Three independent axes decide access: the actor's global role, whether the
//! actor uploaded the document, and the document's custody status. Lawyers
//! and admins pass every check and no override can narrow them.

use dealroom_types::{Actor, DealDocument, DealParticipation, DocumentStatus, Role, Task};

/// Whether the actor may learn that the document exists.
pub fn can_see_metadata(actor: &Actor, doc: &DealDocument) -> bool {
    actor.is_privileged() || actor.is_principal(&doc.uploaded_by) || doc.status != DocumentStatus::Private
}

/// Whether the actor may fetch the document's bytes.
pub fn can_download(actor: &Actor, doc: &DealDocument) -> bool {
    actor.is_privileged() || actor.is_principal(&doc.uploaded_by) || doc.status == DocumentStatus::Released
}

/// Whether a participant may see documents belonging to tasks assigned to `target`.
///
/// Lawyer and admin links keep full visibility whatever their overrides say.
pub fn can_view_all_documents_of_role(participant: &DealParticipation, target: Role) -> bool {
    participant.role.is_privileged()
        || participant.permissions.can_view_all_documents
        || participant.permissions.can_view_roles.contains(&target)
}

/// Verify, release and reject are staff actions.
pub fn can_transition_document(actor: &Actor) -> bool {
    actor.is_privileged()
}

/// Uploads are open to staff and to the active participant holding the
/// task's role with upload rights, regardless of other documents' states.
pub fn can_upload(actor: &Actor, task: &Task, participation: Option<&DealParticipation>) -> bool {
    if actor.is_privileged() {
        return true;
    }
    participation.is_some_and(|p| {
        p.is_active
            && p.deal_id == task.deal_id
            && (p.role.is_privileged()
                || (p.role == task.assigned_to && p.permissions.can_upload_documents))
    })
}

/// Full visibility rule used when listing a deal's documents for an actor.
///
/// Non-staff actors additionally need their deal-scoped grant to cover the
/// role the owning task is assigned to, unless they uploaded the document.
pub fn can_view_document(
    actor: &Actor,
    doc: &DealDocument,
    task: &Task,
    participation: Option<&DealParticipation>,
) -> bool {
    if !can_see_metadata(actor, doc) {
        return false;
    }
    if actor.is_privileged() || actor.is_principal(&doc.uploaded_by) {
        return true;
    }
    participation.is_some_and(|p| {
        p.is_active
            && p.deal_id == task.deal_id
            && can_view_all_documents_of_role(p, task.assigned_to)
    })
}

/// Whether the actor may see the deal's timeline.
pub fn can_view_timeline(actor: &Actor, participation: Option<&DealParticipation>) -> bool {
    actor.is_privileged()
        || participation
            .is_some_and(|p| p.is_active && (p.role.is_privileged() || p.permissions.can_view_timeline))
}

/// Whether an active link carries download rights. Lawyer and admin links always do.
pub fn link_grants_download(participation: &DealParticipation) -> bool {
    participation.is_active
        && (participation.role.is_privileged() || participation.permissions.can_download)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealroom_types::{
        BlobRef, DealId, IdentityId, PermissionOverrides, TaskId, TaskStatus,
    };
    use proptest::prelude::*;

    fn buyer(id: &str) -> Actor {
        Actor::new(format!("user-{id}"), Role::Buyer, &format!("{id}@x.io"))
            .with_identity(IdentityId::new(id))
    }

    fn lawyer() -> Actor {
        Actor::new("lawyer-1", Role::Lawyer, "lee@firm.io")
    }

    fn task(assigned_to: Role) -> Task {
        Task {
            id: TaskId::new("t1"),
            deal_id: DealId::new("d1"),
            title: "Proof of funds".into(),
            assigned_to,
            status: TaskStatus::Pending,
            required: true,
        }
    }

    fn link(identity: &str, role: Role, overrides: PermissionOverrides) -> DealParticipation {
        DealParticipation::new(DealId::new("d1"), IdentityId::new(identity), role, &overrides)
    }

    fn doc_by(uploader: &str, status: DocumentStatus) -> DealDocument {
        let mut doc = DealDocument::new(TaskId::new("t1"), "Funds", BlobRef::new("b1"), uploader);
        doc.status = status;
        doc
    }

    #[test]
    fn test_access_gating_before_and_after_release() {
        let p1 = buyer("p1");
        let p2 = buyer("p2");
        let mut doc = doc_by("p1", DocumentStatus::Private);

        assert!(!can_see_metadata(&p2, &doc));
        assert!(!can_download(&p2, &doc));
        assert!(can_see_metadata(&p1, &doc));
        assert!(can_download(&p1, &doc));
        assert!(can_see_metadata(&lawyer(), &doc));

        doc.status = DocumentStatus::Verified;
        assert!(can_see_metadata(&p2, &doc));
        assert!(!can_download(&p2, &doc));

        doc.status = DocumentStatus::Released;
        assert!(can_see_metadata(&p2, &doc));
        assert!(can_download(&p2, &doc));
    }

    #[test]
    fn test_view_roles_grant() {
        let broker = link("b", Role::Broker, PermissionOverrides::default());
        assert!(can_view_all_documents_of_role(&broker, Role::Seller));
        assert!(!can_view_all_documents_of_role(&broker, Role::Lawyer));

        let opened = link(
            "b",
            Role::Buyer,
            PermissionOverrides {
                can_view_all_documents: Some(true),
                ..Default::default()
            },
        );
        assert!(can_view_all_documents_of_role(&opened, Role::Lawyer));
    }

    #[test]
    fn test_overrides_cannot_narrow_staff_links() {
        let narrowed = PermissionOverrides {
            can_view_all_documents: Some(false),
            can_download: Some(false),
            can_upload_documents: Some(false),
            can_view_timeline: Some(false),
            can_view_roles: Some(vec![]),
        };
        for role in [Role::Lawyer, Role::Admin] {
            let staff = link("l1", role, narrowed.clone());
            for target in Role::ALL {
                assert!(can_view_all_documents_of_role(&staff, target));
            }
            assert!(link_grants_download(&staff));

            let linked = Actor::new("user-l1", Role::Buyer, "l1@x.io").with_identity(IdentityId::new("l1"));
            assert!(can_view_timeline(&linked, Some(&staff)));
            assert!(can_upload(&linked, &task(Role::Seller), Some(&staff)));
        }

        let buyer_link = link("p1", Role::Buyer, narrowed);
        assert!(!can_view_all_documents_of_role(&buyer_link, Role::Buyer));
        assert!(!link_grants_download(&buyer_link));
    }

    #[test]
    fn test_upload_requires_matching_active_role() {
        let actor = buyer("p1");
        let buyer_task = task(Role::Buyer);
        let mut participation = link("p1", Role::Buyer, PermissionOverrides::default());

        assert!(can_upload(&actor, &buyer_task, Some(&participation)));
        assert!(!can_upload(&actor, &task(Role::Seller), Some(&participation)));
        assert!(!can_upload(&actor, &buyer_task, None));

        participation.is_active = false;
        assert!(!can_upload(&actor, &buyer_task, Some(&participation)));

        let muted = link(
            "p1",
            Role::Buyer,
            PermissionOverrides {
                can_upload_documents: Some(false),
                ..Default::default()
            },
        );
        assert!(!can_upload(&actor, &buyer_task, Some(&muted)));
        assert!(can_upload(&lawyer(), &buyer_task, None));
    }

    #[test]
    fn test_view_document_needs_role_grant_for_others() {
        let p2 = buyer("p2");
        let seller_task = task(Role::Seller);
        let released = doc_by("s1", DocumentStatus::Released);
        let buyer_link = link("p2", Role::Buyer, PermissionOverrides::default());

        assert!(!can_view_document(&p2, &released, &seller_task, Some(&buyer_link)));
        assert!(can_view_document(&p2, &released, &task(Role::Buyer), Some(&buyer_link)));
        assert!(can_view_document(&lawyer(), &doc_by("s1", DocumentStatus::Private), &seller_task, None));

        let own = doc_by("p2", DocumentStatus::Private);
        assert!(can_view_document(&p2, &own, &seller_task, None));
    }

    #[test]
    fn test_only_staff_transition_documents() {
        assert!(can_transition_document(&lawyer()));
        assert!(can_transition_document(&Actor::new("a", Role::Admin, "a@x.io")));
        assert!(!can_transition_document(&buyer("p1")));
        assert!(!can_transition_document(&Actor::new("b", Role::Broker, "b@x.io")));
    }

    fn any_status() -> impl Strategy<Value = DocumentStatus> {
        prop_oneof![
            Just(DocumentStatus::Private),
            Just(DocumentStatus::Verified),
            Just(DocumentStatus::Released),
            Just(DocumentStatus::Rejected),
        ]
    }

    proptest! {
        #[test]
        fn privileged_actors_always_pass(status in any_status(), uploader in "[a-z]{1,6}") {
            let doc = doc_by(&uploader, status);
            for actor in [lawyer(), Actor::new("adm", Role::Admin, "adm@x.io")] {
                prop_assert!(can_see_metadata(&actor, &doc));
                prop_assert!(can_download(&actor, &doc));
            }
        }

        #[test]
        fn download_implies_metadata(status in any_status(), own in any::<bool>()) {
            let actor = buyer("p1");
            let doc = doc_by(if own { "p1" } else { "p9" }, status);
            prop_assert!(!can_download(&actor, &doc) || can_see_metadata(&actor, &doc));
        }
    }
}
