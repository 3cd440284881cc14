/*!
 * # AI Analysis Jobs
 *
 * One background job per supplier scores the latest document version with the
 * analysis backend and rates completeness against every version ever
 * submitted. Jobs move PENDING -> IN_PROGRESS -> COMPLETED | FAILED and are
 * never resumed once terminal. Callers poll [`AiAnalysisService::get`] for
 * progress; log lines are only ever appended.
 *
 * Every terminal write is conditional on the row still being active, so a
 * cancelled job cannot later be marked COMPLETED by its own task.
 */

pub mod scoring;

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use serde_json::json;
use slog::{error, info, warn, Logger};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::{is_unique_violation, DbPool};
use crate::entities::ai_analysis_job::{self, JobLogs};
use crate::entities::enums::{AiMode, JobStatus};
use crate::entities::{supplier, supplier_initiation, supplier_onboarding};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{DocumentCategory, VersionEntry};
use crate::services::ai_backend::{AiBackend, ProcessRequest};
use crate::services::document_requirements::{infer_purchase_type, mandatory_documents};
use crate::services::document_store::{document_key, DocumentStore};

use scoring::{AnalysisResults, DocumentAnalysis, DocumentResult, SupplierFacts};

const ACTIVE: [JobStatus; 2] = [JobStatus::Pending, JobStatus::InProgress];

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub job: ai_analysis_job::Model,
    /// True when an active job already existed and was returned unchanged
    pub already_running: bool,
}

#[derive(Clone)]
pub struct AiAnalysisService {
    db: Arc<DbPool>,
    backend: Arc<dyn AiBackend>,
    store: Arc<dyn DocumentStore>,
    event_sender: Arc<EventSender>,
    logger: Logger,
    running: Arc<DashMap<Uuid, CancellationToken>>,
}

impl AiAnalysisService {
    pub fn new(
        db: Arc<DbPool>,
        backend: Arc<dyn AiBackend>,
        store: Arc<dyn DocumentStore>,
        event_sender: Arc<EventSender>,
        logger: Logger,
    ) -> Self {
        Self {
            db,
            backend,
            store,
            event_sender,
            logger,
            running: Arc::new(DashMap::new()),
        }
    }

    /// Starts analysis for a supplier, or returns the job already running.
    #[instrument(skip(self))]
    pub async fn start(&self, supplier_id: Uuid) -> Result<StartOutcome, ServiceError> {
        let db = &*self.db;
        let supplier = supplier::Entity::find_by_id(supplier_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Supplier not found".to_string()))?;

        let Some(latest) = supplier.airtable_data.latest().cloned() else {
            return Err(ServiceError::BadRequest(
                "No documents available to analyze".to_string(),
            ));
        };

        if let Some(existing) = self.active_job(supplier_id).await? {
            info!(self.logger, "analysis already in progress";
                "supplier_id" => %supplier_id, "job_id" => %existing.id);
            return Ok(StartOutcome {
                job: existing,
                already_running: true,
            });
        }

        let now = Utc::now();
        let mut logs = JobLogs::default();
        logs.push(now, "AI analysis job created");
        let pending = ai_analysis_job::ActiveModel {
            supplier_id: Set(supplier_id),
            status: Set(JobStatus::Pending),
            progress: Set(0),
            total_documents: Set(latest.file_count() as i32),
            processed_documents: Set(0),
            current_document: Set(None),
            logs: Set(logs),
            results: Set(None),
            summary: Set(None),
            ai_mode: Set(AiMode::Unknown),
            error_message: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            failed_at: Set(None),
            ..Default::default()
        };

        let job = match pending.insert(db).await {
            Ok(job) => job,
            // Lost the race against a concurrent start; hand back the winner.
            Err(e) if is_unique_violation(&e) => {
                let existing = self.active_job(supplier_id).await?.ok_or_else(|| {
                    ServiceError::Conflict("Analysis already in progress".to_string())
                })?;
                return Ok(StartOutcome {
                    job: existing,
                    already_running: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let token = CancellationToken::new();
        self.running.insert(job.id, token.clone());

        let runner = JobRunner {
            service: self.clone(),
            job_id: job.id,
            supplier,
            latest,
            logs: job.logs.clone(),
            rng: StdRng::from_entropy(),
        };
        tokio::spawn(runner.run(token));

        self.event_sender
            .send_or_log(Event::AiAnalysisStarted {
                job_id: job.id,
                supplier_id,
            })
            .await;
        info!(self.logger, "analysis job started";
            "supplier_id" => %supplier_id, "job_id" => %job.id, "documents" => job.total_documents);

        Ok(StartOutcome {
            job,
            already_running: false,
        })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, job_id: Uuid) -> Result<ai_analysis_job::Model, ServiceError> {
        ai_analysis_job::Entity::find_by_id(job_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Analysis job {} not found", job_id)))
    }

    /// Most recent job for the supplier, whatever its state.
    #[instrument(skip(self))]
    pub async fn latest(
        &self,
        supplier_id: Uuid,
    ) -> Result<Option<ai_analysis_job::Model>, ServiceError> {
        Ok(ai_analysis_job::Entity::find()
            .filter(ai_analysis_job::Column::SupplierId.eq(supplier_id))
            .order_by_desc(ai_analysis_job::Column::CreatedAt)
            .one(&*self.db)
            .await?)
    }

    /// Stops a running job, or force-fails an active row no live task owns
    /// (for example after a restart), so a new job can be started.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        job_id: Uuid,
        reason: &str,
    ) -> Result<ai_analysis_job::Model, ServiceError> {
        // The runner persists log lines while we decide, so the row is re-read
        // under lock and the cancel line appended to what is stored now.
        let txn = self.db.begin().await?;
        let job = ai_analysis_job::Entity::find_by_id(job_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Analysis job {} not found", job_id)))?;
        if !job.status.is_active() {
            return Err(ServiceError::InvalidOperation(format!(
                "Analysis job is already {}",
                job.status
            )));
        }

        let message = format!("Cancelled: {}", reason);
        let now = Utc::now();
        let mut logs = job.logs.clone();
        logs.push(now, &message);
        let failed = write_active_job(
            &txn,
            job_id,
            ai_analysis_job::ActiveModel {
                status: Set(JobStatus::Failed),
                error_message: Set(Some(message)),
                failed_at: Set(Some(now)),
                current_document: Set(None),
                logs: Set(logs),
                ..Default::default()
            },
        )
        .await?;
        txn.commit().await?;

        match self.running.remove(&job_id) {
            Some((_, token)) => {
                token.cancel();
                info!(self.logger, "analysis job cancelled"; "job_id" => %job_id, "reason" => reason);
            }
            None => {
                warn!(self.logger, "force-failed analysis job with no live task";
                    "job_id" => %job_id, "reason" => reason);
            }
        }

        if failed {
            self.event_sender
                .send_or_log(Event::AiAnalysisFinished {
                    job_id,
                    supplier_id: job.supplier_id,
                    succeeded: false,
                })
                .await;
        }
        self.get(job_id).await
    }

    async fn active_job(
        &self,
        supplier_id: Uuid,
    ) -> Result<Option<ai_analysis_job::Model>, ServiceError> {
        Ok(ai_analysis_job::Entity::find()
            .filter(ai_analysis_job::Column::SupplierId.eq(supplier_id))
            .filter(ai_analysis_job::Column::Status.is_in(ACTIVE))
            .order_by_desc(ai_analysis_job::Column::CreatedAt)
            .one(&*self.db)
            .await?)
    }

    async fn write_if_active(
        &self,
        job_id: Uuid,
        changes: ai_analysis_job::ActiveModel,
    ) -> Result<bool, ServiceError> {
        write_active_job(&*self.db, job_id, changes).await
    }
}

/// Applies `changes` only while the job is PENDING or IN_PROGRESS.
/// Returns whether a row was updated.
async fn write_active_job<C: ConnectionTrait>(
    db: &C,
    job_id: Uuid,
    mut changes: ai_analysis_job::ActiveModel,
) -> Result<bool, ServiceError> {
    changes.id = NotSet;
    changes.updated_at = Set(Some(Utc::now()));
    let result = ai_analysis_job::Entity::update_many()
        .set(changes)
        .filter(ai_analysis_job::Column::Id.eq(job_id))
        .filter(ai_analysis_job::Column::Status.is_in(ACTIVE))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Owns one job from IN_PROGRESS to its terminal state.
struct JobRunner {
    service: AiAnalysisService,
    job_id: Uuid,
    supplier: supplier::Model,
    latest: VersionEntry,
    logs: JobLogs,
    rng: StdRng,
}

impl JobRunner {
    async fn run(mut self, token: CancellationToken) {
        let job_id = self.job_id;
        let supplier_id = self.supplier.id;
        let service = self.service.clone();

        let outcome = tokio::select! {
            _ = token.cancelled() => None,
            result = self.execute() => Some(result),
        };
        service.running.remove(&job_id);
        // The cancelling caller already wrote the FAILED row.
        if token.is_cancelled() {
            return;
        }

        let succeeded = match outcome {
            None => return,
            Some(Ok(())) => true,
            Some(Err(e)) => {
                error!(service.logger, "analysis job failed"; "job_id" => %job_id, "error" => %e);
                let failed = ai_analysis_job::ActiveModel {
                    status: Set(JobStatus::Failed),
                    error_message: Set(Some(e.to_string())),
                    failed_at: Set(Some(Utc::now())),
                    current_document: Set(None),
                    ..Default::default()
                };
                if let Err(write_err) = service.write_if_active(job_id, failed).await {
                    error!(service.logger, "could not record job failure";
                        "job_id" => %job_id, "error" => %write_err);
                }
                false
            }
        };

        service
            .event_sender
            .send_or_log(Event::AiAnalysisFinished {
                job_id,
                supplier_id,
                succeeded,
            })
            .await;
    }

    async fn log(&mut self, message: impl AsRef<str>) -> Result<(), ServiceError> {
        self.logs.push(Utc::now(), message);
        self.service
            .write_if_active(
                self.job_id,
                ai_analysis_job::ActiveModel {
                    logs: Set(self.logs.clone()),
                    ..Default::default()
                },
            )
            .await
            .map(|_| ())
    }

    async fn execute(&mut self) -> Result<(), ServiceError> {
        self.service
            .write_if_active(
                self.job_id,
                ai_analysis_job::ActiveModel {
                    status: Set(JobStatus::InProgress),
                    started_at: Set(Some(Utc::now())),
                    ..Default::default()
                },
            )
            .await?;
        self.log("Starting AI document analysis...").await?;

        let ai_mode = self.probe_backend().await?;

        let version_count = self.supplier.airtable_data.all_versions().len();
        let version = self.latest.version;
        let total = self.latest.file_count();
        self.log(format!("Found {} version(s) of documents", version_count))
            .await?;
        self.log(format!("Analyzing latest version (v{})...", version))
            .await?;
        self.log(format!("Total documents to process: {}", total))
            .await?;

        let document_analysis = self.analyse_latest_version(total).await?;
        let processed: usize = document_analysis.values().map(Vec::len).sum();

        self.log("Performing compliance verification...").await?;
        let results = self.score(document_analysis).await?;

        let overall = results.overall_score;
        self.logs.push(
            Utc::now(),
            format!(
                "Analysis completed successfully! Overall score: {:.1}%",
                overall
            ),
        );
        let completed = ai_analysis_job::ActiveModel {
            status: Set(JobStatus::Completed),
            progress: Set(100),
            current_document: Set(None),
            results: Set(Some(serde_json::to_value(&results)?)),
            summary: Set(Some(json!({
                "overallScore": overall,
                "totalDocuments": total,
                "processedDocuments": processed,
                "aiMode": ai_mode,
            }))),
            completed_at: Set(Some(Utc::now())),
            logs: Set(self.logs.clone()),
            ..Default::default()
        };
        if !self.service.write_if_active(self.job_id, completed).await? {
            return Err(ServiceError::InvalidOperation(
                "Analysis job was stopped before it completed".to_string(),
            ));
        }
        info!(self.service.logger, "analysis job completed";
            "job_id" => %self.job_id, "overall_score" => overall, "processed" => processed);
        Ok(())
    }

    async fn probe_backend(&mut self) -> Result<AiMode, ServiceError> {
        self.log("Checking AI backend status...").await?;
        let ai_mode = match self.service.backend.health().await {
            Ok(report) => {
                let mode = report.mode();
                if mode == AiMode::Ollama {
                    self.log("Using Ollama (Local LLM) - Full AI analysis enabled")
                        .await?;
                    let model = report.ollama_model.as_deref().unwrap_or("llama3.1");
                    self.log(format!("   Model: {}", model)).await?;
                } else {
                    self.log("Using fallback mode - Limited analysis (Ollama unavailable)")
                        .await?;
                }
                mode
            }
            Err(e) => {
                self.log(format!("Could not connect to worker service: {}", e))
                    .await?;
                self.log("Using fallback mode - Limited analysis").await?;
                AiMode::Simplified
            }
        };
        self.service
            .write_if_active(
                self.job_id,
                ai_analysis_job::ActiveModel {
                    ai_mode: Set(ai_mode),
                    ..Default::default()
                },
            )
            .await?;
        Ok(ai_mode)
    }

    async fn analyse_latest_version(
        &mut self,
        total: usize,
    ) -> Result<DocumentAnalysis, ServiceError> {
        let mut analysis = DocumentAnalysis::new();
        let mut processed = 0usize;
        let files: Vec<(DocumentCategory, Vec<String>)> = self
            .latest
            .uploaded_files
            .iter()
            .filter(|(_, names)| !names.is_empty())
            .map(|(category, names)| (*category, names.clone()))
            .collect();

        for (category, names) in files {
            self.log(format!("Processing category: {}", category.label()))
                .await?;
            let mut category_results = Vec::new();

            for file_name in names {
                self.service
                    .write_if_active(
                        self.job_id,
                        ai_analysis_job::ActiveModel {
                            current_document: Set(Some(format!("{}/{}", category, file_name))),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.log(format!("  Analyzing: {}...", file_name)).await?;

                let key = document_key(
                    &self.supplier.supplier_code,
                    self.latest.version,
                    category,
                    &file_name,
                );
                let bytes = match self.service.store.read(&key).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        self.log(format!("  Error processing {}: {}", file_name, e))
                            .await?;
                        continue;
                    }
                };

                let result = self.analyse_file(category, &file_name, bytes).await?;
                category_results.push(result);
                processed += 1;

                let progress = if total == 0 {
                    100
                } else {
                    ((processed as f64 / total as f64) * 100.0).round() as i32
                };
                self.service
                    .write_if_active(
                        self.job_id,
                        ai_analysis_job::ActiveModel {
                            progress: Set(progress.min(100)),
                            processed_documents: Set(processed as i32),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.log(format!(
                    "  Completed: {} ({}/{})",
                    file_name, processed, total
                ))
                .await?;
            }

            if !category_results.is_empty() {
                analysis.insert(category, category_results);
            }
        }
        Ok(analysis)
    }

    async fn analyse_file(
        &mut self,
        category: DocumentCategory,
        file_name: &str,
        bytes: Bytes,
    ) -> Result<DocumentResult, ServiceError> {
        self.log("  Running AI analysis...").await?;
        let backend = self.service.backend.clone();
        let uploaded = match backend.upload(file_name, bytes).await {
            Ok(uploaded) => uploaded,
            Err(e) => return self.basic_check(file_name, &e.to_string()).await,
        };

        let profile = &self.supplier.profile;
        let request = ProcessRequest {
            document_id: uploaded.document_id,
            content: uploaded.content,
            document_type: category,
            filename: file_name.to_string(),
            supplier_email: self.supplier.contact_email.clone(),
            supplier_name: self.supplier.company_name.clone(),
            form_data: json!({
                "companyName": self.supplier.company_name,
                "registrationNumber": self.supplier.registration_number,
                "physicalAddress": profile.physical_address,
                "contactEmail": self.supplier.contact_email,
                "contactPerson": self.supplier.contact_person,
                "bbbeeLevel": profile.bbbee_status,
                "bankName": profile.bank_name,
                "branchName": profile.branch_name,
                "branchNumber": profile.branch_number,
                "accountNumber": profile.account_number,
                "typeOfAccount": profile.type_of_account,
                "bankAccountName": profile.bank_account_name,
            }),
        };

        let processed = match backend.process_document(request).await {
            Ok(processed) => processed,
            Err(e) => return self.basic_check(file_name, &e.to_string()).await,
        };

        let result = DocumentResult::analyzed(file_name, &processed, &mut self.rng);
        if result.document_type_mismatch {
            self.log(format!("  DOCUMENT TYPE MISMATCH detected for {}", file_name))
                .await?;
            if let Some(summary) = result.mismatch_summary() {
                self.log(format!("     {}", summary)).await?;
            }
            self.log(format!(
                "  Confidence reduced due to document type mismatch: {:.1}%",
                result.confidence
            ))
            .await?;
        }
        Ok(result)
    }

    async fn basic_check(
        &mut self,
        file_name: &str,
        reason: &str,
    ) -> Result<DocumentResult, ServiceError> {
        self.log(format!(
            "  AI processing unavailable: {}, using basic analysis...",
            reason
        ))
        .await?;
        Ok(DocumentResult::basic_check(file_name, reason))
    }

    async fn score(
        &mut self,
        document_analysis: DocumentAnalysis,
    ) -> Result<AnalysisResults, ServiceError> {
        let uploaded: BTreeSet<DocumentCategory> =
            self.supplier.airtable_data.union_of_categories();

        let initiation = supplier_onboarding::Entity::find()
            .filter(supplier_onboarding::Column::SupplierId.eq(self.supplier.id))
            .find_also_related(supplier_initiation::Entity)
            .one(&*self.service.db)
            .await?
            .and_then(|(_, initiation)| initiation);
        let (purchase_type, credit_application) = match &initiation {
            Some(i) => (i.purchase_type, i.credit_application),
            None => (infer_purchase_type(&uploaded), false),
        };

        let facts = SupplierFacts {
            purchase_type,
            credit_application,
            uploaded: &uploaded,
            profile: &self.supplier.profile,
            registration_number: self.supplier.registration_number.as_deref(),
        };
        let results = scoring::score(&facts, document_analysis);
        let check = &results.compliance_check;

        let mut lines = vec![
            format!(
                "Mandatory documents: {} required",
                mandatory_documents(purchase_type, credit_application).len()
            ),
            format!(
                "Credit Application required: {}",
                if credit_application { "YES" } else { "NO" }
            ),
        ];
        if uploaded.contains(&DocumentCategory::TaxClearance) {
            lines.push("Tax requirement satisfied with: Tax Clearance Certificate".to_string());
        } else if uploaded.contains(&DocumentCategory::GoodStanding) {
            lines.push("Tax requirement satisfied with: Letter of Good Standing".to_string());
        }
        lines.push(format!(
            "Optional documents provided: {}",
            check.optional_docs_count
        ));
        if check.missing_documents.is_empty() {
            lines.push("All required documents provided".to_string());
        } else {
            let names: Vec<String> = check
                .missing_documents
                .iter()
                .map(ToString::to_string)
                .collect();
            lines.push(format!(
                "Missing required documents: {}",
                names.join(", ")
            ));
        }
        for claimed in &check.claimed_but_missing {
            lines.push(format!(
                "{} - Supplier indicated they have this but did not upload certificate",
                claimed.cert_name
            ));
        }
        lines.push(format!(
            "Average document quality: {:.1}%",
            check.average_document_quality
        ));
        lines.push(format!(
            "Document Completeness Risk: {:?}",
            results.risk_assessment.document_completeness
        ));
        lines.push(format!(
            "Document Quality Risk: {:?}",
            results.risk_assessment.document_quality
        ));
        lines.push(format!("Base Score: {:.1}/100", check.compliance_score));
        lines.push(format!(
            "Risk Penalty: -{:.1} points",
            results.risk_assessment.penalty()
        ));
        lines.push(format!(
            "Overall Supplier Score: {:.1}/100",
            results.overall_score
        ));
        lines.extend(results.insights.iter().map(|i| format!("   {}", i)));

        for line in lines {
            self.log(line).await?;
        }
        Ok(results)
    }
}
