#![allow(dead_code)]

use dealroom_service::{DealroomConfig, DealroomService, IdentityRef};
use dealroom_types::{
    Actor, Deal, Identity, IdentityCandidate, NewDeal, NewTask, PermissionOverrides, Role, Task,
};

pub fn lawyer() -> Actor {
    Actor::new("lawyer-1", Role::Lawyer, "lee@firm.io").with_display_name("Lee Lawyer")
}

pub fn admin() -> Actor {
    Actor::new("admin-1", Role::Admin, "ada@firm.io").with_display_name("Ada Admin")
}

pub fn broker() -> Actor {
    Actor::new("broker-1", Role::Broker, "bo@agency.io").with_display_name("Bo Broker")
}

/// An external participant session authenticated under `email`.
pub fn party(user_id: &str, role: Role, email: &str) -> Actor {
    Actor::new(user_id, role, email)
}

pub fn service() -> DealroomService {
    DealroomService::in_memory(DealroomConfig::default()).unwrap()
}

pub async fn open_deal(service: &DealroomService) -> Deal {
    service
        .create_deal(
            &broker(),
            NewDeal {
                title: "14 Harbour Lane".into(),
                property_address: "14 Harbour Lane, Portside".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

pub async fn join(service: &DealroomService, deal: &Deal, name: &str, email: &str, role: Role) -> Identity {
    service
        .add_participant(
            &broker(),
            &deal.id,
            IdentityRef::Candidate(IdentityCandidate::new(name, email)),
            role,
            &PermissionOverrides::default(),
        )
        .await
        .unwrap()
        .identity
}

pub async fn task_for(service: &DealroomService, deal: &Deal, title: &str, role: Role) -> Task {
    service
        .create_task(
            &broker(),
            &deal.id,
            NewTask {
                title: title.into(),
                assigned_to: role,
                required: true,
            },
        )
        .await
        .unwrap()
}
