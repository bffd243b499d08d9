//! Role resolution and the action permission table.
//!
//! Roles are never stored. Each check gathers the caller's facts for one world
//! and derives the role from them, so a lost mayoralty or a closed business
//! takes effect on the next call.

use crate::engine::EconomyEngine;
use crate::error::{EconomyError, EconomyResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};
use vexium_types::{CitizenId, UserId, WorldId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    None,
    Citizen,
    BusinessOwner,
    Mayor,
    WorldOwner,
    ProtocolAdmin,
}

impl Role {
    pub fn rank(self) -> u8 {
        match self {
            Self::ProtocolAdmin => 100,
            Self::WorldOwner => 80,
            Self::Mayor => 60,
            Self::BusinessOwner => 40,
            Self::Citizen => 20,
            Self::None => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProtocolAdmin => "PROTOCOL_ADMIN",
            Self::WorldOwner => "WORLD_OWNER",
            Self::Mayor => "MAYOR",
            Self::BusinessOwner => "BUSINESS_OWNER",
            Self::Citizen => "CITIZEN",
            Self::None => "NONE",
        }
    }

    pub fn satisfies(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Economic and governance actions gated by role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    ViewEconomy,
    TransferFunds,
    ReplenishNeeds,
    RunProduction,
    ManageBusiness,
    CollectFees,
    IssueSubsidy,
    IssueLoan,
    ManageTreasury,
    TriggerDecay,
    UpdateWorldSettings,
    ManageWorldStatus,
    ManageRegions,
    AppointMayor,
}

impl Action {
    pub const ALL: [Action; 14] = [
        Self::ViewEconomy,
        Self::TransferFunds,
        Self::ReplenishNeeds,
        Self::RunProduction,
        Self::ManageBusiness,
        Self::CollectFees,
        Self::IssueSubsidy,
        Self::IssueLoan,
        Self::ManageTreasury,
        Self::TriggerDecay,
        Self::UpdateWorldSettings,
        Self::ManageWorldStatus,
        Self::ManageRegions,
        Self::AppointMayor,
    ];

    /// Minimum role for the action.
    pub fn required_role(self) -> Role {
        match self {
            Self::ViewEconomy | Self::TransferFunds | Self::ReplenishNeeds => Role::Citizen,
            Self::RunProduction | Self::ManageBusiness => Role::BusinessOwner,
            Self::CollectFees | Self::IssueSubsidy => Role::Mayor,
            Self::IssueLoan
            | Self::ManageTreasury
            | Self::TriggerDecay
            | Self::UpdateWorldSettings
            | Self::ManageWorldStatus
            | Self::ManageRegions
            | Self::AppointMayor => Role::WorldOwner,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ViewEconomy => "VIEW_ECONOMY",
            Self::TransferFunds => "TRANSFER_FUNDS",
            Self::ReplenishNeeds => "REPLENISH_NEEDS",
            Self::RunProduction => "RUN_PRODUCTION",
            Self::ManageBusiness => "MANAGE_BUSINESS",
            Self::CollectFees => "COLLECT_FEES",
            Self::IssueSubsidy => "ISSUE_SUBSIDY",
            Self::IssueLoan => "ISSUE_LOAN",
            Self::ManageTreasury => "MANAGE_TREASURY",
            Self::TriggerDecay => "TRIGGER_DECAY",
            Self::UpdateWorldSettings => "UPDATE_WORLD_SETTINGS",
            Self::ManageWorldStatus => "MANAGE_WORLD_STATUS",
            Self::ManageRegions => "MANAGE_REGIONS",
            Self::AppointMayor => "APPOINT_MAYOR",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is currently true about one identity in one world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFacts {
    pub protocol_admin: bool,
    pub world_owner: bool,
    pub mayor: bool,
    pub owns_active_business: bool,
    pub citizen: bool,
}

/// Highest role the facts support.
pub fn resolve_role(facts: RoleFacts) -> Role {
    if facts.protocol_admin {
        Role::ProtocolAdmin
    } else if facts.world_owner {
        Role::WorldOwner
    } else if facts.mayor {
        Role::Mayor
    } else if facts.owns_active_business {
        Role::BusinessOwner
    } else if facts.citizen {
        Role::Citizen
    } else {
        Role::None
    }
}

impl EconomyEngine {
    pub async fn role_facts(&self, world_id: WorldId, user: &UserId) -> EconomyResult<RoleFacts> {
        let world = self.load_world(world_id).await?;
        let mut facts = RoleFacts {
            protocol_admin: self.config().is_protocol_admin(user),
            world_owner: &world.owner == user,
            ..RoleFacts::default()
        };
        if let Some(citizen) = self.store().citizen_by_user(world_id, user).await? {
            facts.citizen = true;
            facts.mayor = self
                .store()
                .regions(world_id)
                .await?
                .iter()
                .any(|region| region.mayor == Some(citizen.id));
            facts.owns_active_business = self
                .store()
                .businesses(world_id)
                .await?
                .iter()
                .any(|business| business.owner_id == citizen.id && business.active);
        }
        Ok(facts)
    }

    pub async fn user_role(&self, world_id: WorldId, user: &UserId) -> EconomyResult<Role> {
        let role = resolve_role(self.role_facts(world_id, user).await?);
        debug!(world_id = %world_id, user = %user, role = %role, "Resolved role");
        Ok(role)
    }

    pub async fn citizen_role(&self, citizen_id: CitizenId) -> EconomyResult<Role> {
        let citizen = self.load_citizen(citizen_id).await?;
        self.user_role(citizen.world_id, &citizen.user_id).await
    }

    pub async fn check_permission(
        &self,
        world_id: WorldId,
        user: &UserId,
        action: Action,
    ) -> EconomyResult<bool> {
        Ok(self
            .user_role(world_id, user)
            .await?
            .satisfies(action.required_role()))
    }

    /// Fails with `PermissionDenied` unless the user's role covers `action`.
    pub async fn require_permission(
        &self,
        world_id: WorldId,
        user: &UserId,
        action: Action,
    ) -> EconomyResult<Role> {
        let actual = self.user_role(world_id, user).await?;
        let required = action.required_role();
        if !actual.satisfies(required) {
            warn!(
                world_id = %world_id,
                user = %user,
                action = %action,
                required = %required,
                actual = %actual,
                "Permission denied"
            );
            return Err(EconomyError::PermissionDenied {
                action,
                required,
                actual,
            });
        }
        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Fixture;

    #[test]
    fn resolution_prefers_the_highest_fact() {
        let all = RoleFacts {
            protocol_admin: true,
            world_owner: true,
            mayor: true,
            owns_active_business: true,
            citizen: true,
        };
        assert_eq!(resolve_role(all), Role::ProtocolAdmin);
        assert_eq!(
            resolve_role(RoleFacts {
                protocol_admin: false,
                ..all
            }),
            Role::WorldOwner
        );
        assert_eq!(
            resolve_role(RoleFacts {
                mayor: true,
                citizen: true,
                ..RoleFacts::default()
            }),
            Role::Mayor
        );
        assert_eq!(
            resolve_role(RoleFacts {
                owns_active_business: true,
                citizen: true,
                ..RoleFacts::default()
            }),
            Role::BusinessOwner
        );
        assert_eq!(resolve_role(RoleFacts::default()), Role::None);
    }

    #[test]
    fn ranks_are_strictly_ordered() {
        let ranks: Vec<u8> = [
            Role::None,
            Role::Citizen,
            Role::BusinessOwner,
            Role::Mayor,
            Role::WorldOwner,
            Role::ProtocolAdmin,
        ]
        .iter()
        .map(|role| role.rank())
        .collect();
        assert_eq!(ranks, vec![0, 20, 40, 60, 80, 100]);
        assert!(Role::Mayor > Role::BusinessOwner);
    }

    #[test]
    fn governance_actions_need_the_world_owner() {
        for action in [
            Action::UpdateWorldSettings,
            Action::ManageWorldStatus,
            Action::ManageRegions,
            Action::AppointMayor,
        ] {
            assert_eq!(action.required_role(), Role::WorldOwner);
        }
        assert!(Action::ALL
            .iter()
            .all(|action| Role::ProtocolAdmin.satisfies(action.required_role())));
        assert!(Action::ALL
            .iter()
            .all(|action| !Role::None.satisfies(action.required_role())));
    }

    #[tokio::test]
    async fn roles_track_current_facts() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 0).await;
        let alice_user = UserId::new("alice");

        assert_eq!(fx.engine.citizen_role(alice).await.unwrap(), Role::Citizen);
        assert_eq!(
            fx.engine
                .user_role(fx.world_id, &UserId::new("nobody"))
                .await
                .unwrap(),
            Role::None
        );
        assert_eq!(
            fx.engine.user_role(fx.world_id, &fx.owner).await.unwrap(),
            Role::WorldOwner
        );

        fx.business(alice, 0, 0).await;
        assert_eq!(
            fx.engine.user_role(fx.world_id, &alice_user).await.unwrap(),
            Role::BusinessOwner
        );
        assert!(fx
            .engine
            .check_permission(fx.world_id, &alice_user, Action::RunProduction)
            .await
            .unwrap());

        let region = fx
            .engine
            .create_region(&fx.owner, fx.world_id, "Harbor")
            .await
            .unwrap();
        fx.engine
            .appoint_mayor(&fx.owner, fx.world_id, region.id, Some(alice))
            .await
            .unwrap();
        assert_eq!(fx.engine.citizen_role(alice).await.unwrap(), Role::Mayor);

        fx.engine
            .appoint_mayor(&fx.owner, fx.world_id, region.id, None)
            .await
            .unwrap();
        assert_eq!(
            fx.engine.citizen_role(alice).await.unwrap(),
            Role::BusinessOwner
        );
    }

    #[tokio::test]
    async fn require_permission_reports_both_roles() {
        let fx = Fixture::new().await;
        fx.citizen("alice", 0).await;

        let err = fx
            .engine
            .require_permission(fx.world_id, &UserId::new("alice"), Action::IssueLoan)
            .await
            .unwrap_err();
        match err {
            EconomyError::PermissionDenied {
                action,
                required,
                actual,
            } => {
                assert_eq!(action, Action::IssueLoan);
                assert_eq!(required, Role::WorldOwner);
                assert_eq!(actual, Role::Citizen);
            }
            other => panic!("unexpected error {other:?}"),
        }

        let engine = fx.engine_with_admin("root");
        assert_eq!(
            engine
                .require_permission(fx.world_id, &UserId::new("root"), Action::ManageWorldStatus)
                .await
                .unwrap(),
            Role::ProtocolAdmin
        );
    }
}
