use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_users_table::Migration),
            Box::new(m20240301_000002_create_initiation_tables::Migration),
            Box::new(m20240301_000003_create_user_delegations_table::Migration),
            Box::new(m20240301_000004_create_supplier_tables::Migration),
            Box::new(m20240301_000005_create_ai_analysis_jobs_table::Migration),
            Box::new(m20240301_000006_create_reminder_logs_table::Migration),
        ]
    }
}

mod m20240301_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Users::Email)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Role).string_len(32).not_null())
                        .col(ColumnDef::new(Users::ManagerId).uuid().null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Users::UpdatedAt).timestamp_with_time_zone().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_users_manager_id")
                                .from(Users::Table, Users::ManagerId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_role_active")
                        .table(Users::Table)
                        .col(Users::Role)
                        .col(Users::IsActive)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Email,
        Name,
        Role,
        ManagerId,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_initiation_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_initiation_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SupplierInitiations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupplierInitiations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::InitiatedById)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::RequesterName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::SupplierName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::SupplierEmail)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::SupplierContactPerson)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::BusinessUnits)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::ProductServiceCategory)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::PurchaseType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::PaymentMethod)
                                .string_len(10)
                                .null(),
                        )
                        .col(ColumnDef::new(SupplierInitiations::CodReason).text().null())
                        .col(
                            ColumnDef::new(SupplierInitiations::AnnualPurchaseValue)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::CreditApplication)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::CreditApplicationReason)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::OnboardingReason)
                                .text()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::RelationshipDeclaration)
                                .text()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::ProcessReadUnderstood)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::DueDiligenceCompleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::SubmittedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::EmailSent)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::EmailSentAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierInitiations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_supplier_initiations_initiated_by")
                                .from(SupplierInitiations::Table, SupplierInitiations::InitiatedById)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_supplier_initiations_initiated_by")
                        .table(SupplierInitiations::Table)
                        .col(SupplierInitiations::InitiatedById)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_supplier_initiations_status")
                        .table(SupplierInitiations::Table)
                        .col(SupplierInitiations::Status)
                        .to_owned(),
                )
                .await?;

            // One gate of each kind per initiation; the unique key makes
            // create-if-absent a storage-level operation.
            manager
                .create_table(approval_table(ManagerApprovals::Table, "manager"))
                .await?;
            manager
                .create_table(approval_table(ProcurementApprovals::Table, "procurement"))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProcurementApprovals::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ManagerApprovals::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SupplierInitiations::Table).to_owned())
                .await
        }
    }

    fn approval_table<T: IntoIden + 'static>(table: T, prefix: &str) -> TableCreateStatement {
        let table = table.into_iden();
        Table::create()
            .table(table.clone())
            .if_not_exists()
            .col(ColumnDef::new(Approvals::Id).uuid().primary_key().not_null())
            .col(
                ColumnDef::new(Approvals::InitiationId)
                    .uuid()
                    .not_null()
                    .unique_key(),
            )
            .col(ColumnDef::new(Approvals::ApproverId).uuid().not_null())
            .col(ColumnDef::new(Approvals::Status).string_len(20).not_null())
            .col(ColumnDef::new(Approvals::DecidedById).uuid().null())
            .col(ColumnDef::new(Approvals::ApprovedAt).timestamp_with_time_zone().null())
            .col(ColumnDef::new(Approvals::Comments).text().null())
            .col(ColumnDef::new(Approvals::CreatedAt).timestamp_with_time_zone().not_null())
            .col(ColumnDef::new(Approvals::UpdatedAt).timestamp_with_time_zone().null())
            .foreign_key(
                ForeignKey::create()
                    .name(format!("fk_{}_approvals_initiation_id", prefix))
                    .from(table.clone(), Approvals::InitiationId)
                    .to(SupplierInitiations::Table, SupplierInitiations::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                    .on_update(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name(format!("fk_{}_approvals_approver_id", prefix))
                    .from(table, Approvals::ApproverId)
                    .to(Users::Table, Users::Id)
                    .on_delete(ForeignKeyAction::Restrict),
            )
            .to_owned()
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum SupplierInitiations {
        Table,
        Id,
        InitiatedById,
        RequesterName,
        SupplierName,
        SupplierEmail,
        SupplierContactPerson,
        BusinessUnits,
        ProductServiceCategory,
        PurchaseType,
        PaymentMethod,
        CodReason,
        AnnualPurchaseValue,
        CreditApplication,
        CreditApplicationReason,
        OnboardingReason,
        RelationshipDeclaration,
        ProcessReadUnderstood,
        DueDiligenceCompleted,
        Status,
        SubmittedAt,
        EmailSent,
        EmailSentAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ManagerApprovals {
        Table,
    }

    #[derive(DeriveIden)]
    enum ProcurementApprovals {
        Table,
    }

    #[derive(DeriveIden)]
    enum Approvals {
        Id,
        InitiationId,
        ApproverId,
        Status,
        DecidedById,
        ApprovedAt,
        Comments,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_user_delegations_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_user_delegations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(UserDelegations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(UserDelegations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UserDelegations::DelegatorId).uuid().not_null())
                        .col(ColumnDef::new(UserDelegations::DelegateId).uuid().not_null())
                        .col(
                            ColumnDef::new(UserDelegations::DelegationType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UserDelegations::StartDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UserDelegations::EndDate).timestamp_with_time_zone().not_null())
                        .col(
                            ColumnDef::new(UserDelegations::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(UserDelegations::Reason).text().null())
                        .col(
                            ColumnDef::new(UserDelegations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UserDelegations::UpdatedAt).timestamp_with_time_zone().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_user_delegations_delegator_id")
                                .from(UserDelegations::Table, UserDelegations::DelegatorId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_user_delegations_delegate_id")
                                .from(UserDelegations::Table, UserDelegations::DelegateId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_user_delegations_delegator_active")
                        .table(UserDelegations::Table)
                        .col(UserDelegations::DelegatorId)
                        .col(UserDelegations::IsActive)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_user_delegations_delegate_active")
                        .table(UserDelegations::Table)
                        .col(UserDelegations::DelegateId)
                        .col(UserDelegations::IsActive)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(UserDelegations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum UserDelegations {
        Table,
        Id,
        DelegatorId,
        DelegateId,
        DelegationType,
        StartDate,
        EndDate,
        IsActive,
        Reason,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_supplier_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_supplier_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Suppliers::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Suppliers::SupplierCode)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Suppliers::CompanyName).string().not_null())
                        .col(ColumnDef::new(Suppliers::ContactPerson).string().not_null())
                        .col(
                            ColumnDef::new(Suppliers::ContactEmail)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Suppliers::ContactPhone).string().null())
                        .col(ColumnDef::new(Suppliers::RegistrationNumber).string().null())
                        .col(ColumnDef::new(Suppliers::VatNumber).string().null())
                        .col(ColumnDef::new(Suppliers::Profile).json().not_null())
                        .col(ColumnDef::new(Suppliers::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Suppliers::AirtableData).json().not_null())
                        .col(ColumnDef::new(Suppliers::CreatedById).uuid().null())
                        .col(ColumnDef::new(Suppliers::ApprovedAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Suppliers::ApprovedById).uuid().null())
                        .col(ColumnDef::new(Suppliers::RejectionReason).text().null())
                        .col(ColumnDef::new(Suppliers::CreditController).string().null())
                        .col(ColumnDef::new(Suppliers::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Suppliers::UpdatedAt).timestamp_with_time_zone().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_suppliers_status")
                        .table(Suppliers::Table)
                        .col(Suppliers::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SupplierOnboardings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupplierOnboardings::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::SupplierId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::InitiationId)
                                .uuid()
                                .null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::OnboardingToken)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::CurrentStep)
                                .string_len(40)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::OverallStatus)
                                .string_len(40)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::ApprovalStatus)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::RevisionCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::RevisionRequested)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(SupplierOnboardings::RevisionNotes).text().null())
                        .col(
                            ColumnDef::new(SupplierOnboardings::RevisionRequestedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::DocumentsToRevise)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::SupplierFormSubmitted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::SupplierFormSubmittedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::EmailSent)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::EmailSentAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplierOnboardings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_supplier_onboardings_supplier_id")
                                .from(SupplierOnboardings::Table, SupplierOnboardings::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_supplier_onboardings_initiation_id")
                                .from(
                                    SupplierOnboardings::Table,
                                    SupplierOnboardings::InitiationId,
                                )
                                .to(SupplierInitiations::Table, SupplierInitiations::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OnboardingTimeline::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OnboardingTimeline::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OnboardingTimeline::OnboardingId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OnboardingTimeline::Step)
                                .string_len(40)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OnboardingTimeline::Status)
                                .string_len(40)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OnboardingTimeline::Action).string().not_null())
                        .col(
                            ColumnDef::new(OnboardingTimeline::Description)
                                .text()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OnboardingTimeline::PerformedBy).uuid().null())
                        .col(
                            ColumnDef::new(OnboardingTimeline::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_onboarding_timeline_onboarding_id")
                                .from(OnboardingTimeline::Table, OnboardingTimeline::OnboardingId)
                                .to(SupplierOnboardings::Table, SupplierOnboardings::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_onboarding_timeline_onboarding_id")
                        .table(OnboardingTimeline::Table)
                        .col(OnboardingTimeline::OnboardingId)
                        .col(OnboardingTimeline::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OnboardingTimeline::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SupplierOnboardings::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SupplierInitiations {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        Id,
        SupplierCode,
        CompanyName,
        ContactPerson,
        ContactEmail,
        ContactPhone,
        RegistrationNumber,
        VatNumber,
        Profile,
        Status,
        AirtableData,
        CreatedById,
        ApprovedAt,
        ApprovedById,
        RejectionReason,
        CreditController,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SupplierOnboardings {
        Table,
        Id,
        SupplierId,
        InitiationId,
        OnboardingToken,
        CurrentStep,
        OverallStatus,
        ApprovalStatus,
        RevisionCount,
        RevisionRequested,
        RevisionNotes,
        RevisionRequestedAt,
        DocumentsToRevise,
        SupplierFormSubmitted,
        SupplierFormSubmittedAt,
        EmailSent,
        EmailSentAt,
        CompletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OnboardingTimeline {
        Table,
        Id,
        OnboardingId,
        Step,
        Status,
        Action,
        Description,
        PerformedBy,
        CreatedAt,
    }
}

mod m20240301_000005_create_ai_analysis_jobs_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_ai_analysis_jobs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AiAnalysisJobs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AiAnalysisJobs::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AiAnalysisJobs::SupplierId).uuid().not_null())
                        .col(
                            ColumnDef::new(AiAnalysisJobs::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AiAnalysisJobs::Progress)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(AiAnalysisJobs::TotalDocuments)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(AiAnalysisJobs::ProcessedDocuments)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(AiAnalysisJobs::CurrentDocument).string().null())
                        .col(ColumnDef::new(AiAnalysisJobs::Logs).json().not_null())
                        .col(ColumnDef::new(AiAnalysisJobs::Results).json().null())
                        .col(ColumnDef::new(AiAnalysisJobs::Summary).json().null())
                        .col(
                            ColumnDef::new(AiAnalysisJobs::AiMode)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(AiAnalysisJobs::ErrorMessage).text().null())
                        .col(ColumnDef::new(AiAnalysisJobs::StartedAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(AiAnalysisJobs::CompletedAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(AiAnalysisJobs::FailedAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(AiAnalysisJobs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AiAnalysisJobs::UpdatedAt).timestamp_with_time_zone().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_ai_analysis_jobs_supplier_id")
                                .from(AiAnalysisJobs::Table, AiAnalysisJobs::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ai_analysis_jobs_supplier_created")
                        .table(AiAnalysisJobs::Table)
                        .col(AiAnalysisJobs::SupplierId)
                        .col(AiAnalysisJobs::CreatedAt)
                        .to_owned(),
                )
                .await?;

            // Partial unique index: one PENDING/IN_PROGRESS job per supplier.
            // Both SQLite and PostgreSQL accept this syntax.
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS uq_ai_analysis_jobs_active_supplier \
                     ON ai_analysis_jobs (supplier_id) \
                     WHERE status IN ('PENDING', 'IN_PROGRESS')",
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .get_connection()
                .execute_unprepared("DROP INDEX IF EXISTS uq_ai_analysis_jobs_active_supplier")
                .await?;
            manager
                .drop_table(Table::drop().table(AiAnalysisJobs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum AiAnalysisJobs {
        Table,
        Id,
        SupplierId,
        Status,
        Progress,
        TotalDocuments,
        ProcessedDocuments,
        CurrentDocument,
        Logs,
        Results,
        Summary,
        AiMode,
        ErrorMessage,
        StartedAt,
        CompletedAt,
        FailedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000006_create_reminder_logs_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_reminder_logs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReminderLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ReminderLogs::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(ReminderLogs::ReminderType)
                                .string_len(40)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReminderLogs::ReferenceId).uuid().not_null())
                        .col(ColumnDef::new(ReminderLogs::RecipientEmail).string().not_null())
                        .col(ColumnDef::new(ReminderLogs::Status).string_len(16).not_null())
                        .col(ColumnDef::new(ReminderLogs::ErrorMessage).text().null())
                        .col(ColumnDef::new(ReminderLogs::SentAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(ReminderLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReminderLogs::UpdatedAt).timestamp_with_time_zone().null())
                        .to_owned(),
                )
                .await?;

            // One row per reminder and recipient; a failed send is retried
            // by updating the same row.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("uq_reminder_logs_type_reference_recipient")
                        .table(ReminderLogs::Table)
                        .col(ReminderLogs::ReminderType)
                        .col(ReminderLogs::ReferenceId)
                        .col(ReminderLogs::RecipientEmail)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReminderLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ReminderLogs {
        Table,
        Id,
        ReminderType,
        ReferenceId,
        RecipientEmail,
        Status,
        ErrorMessage,
        SentAt,
        CreatedAt,
        UpdatedAt,
    }
}
