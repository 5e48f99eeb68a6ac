//! LeadNurturer: lead capture, trigger evaluation, interactions, status
//! transitions and outbox dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::store::{self, CollectionStore};
use bizaudit_core::traits::{Clock, EmailSender};
use bizaudit_core::types::{OutgoingEmail, collections};

use crate::lead::{Interaction, Lead, LeadStatus, NewLead, NurturingStage};
use crate::outbox::{EmailStatus, Outbox};
use crate::scoring;
use crate::sequence::{NurturingSequence, default_sequences};

/// Called after every status change with the updated lead and its previous status.
pub type StatusHook = Box<dyn Fn(&Lead, LeadStatus) + Send + Sync>;

/// Outcome of one outbox pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NurtureStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_stage: BTreeMap<String, usize>,
    pub average_score: f64,
    pub pending_emails: usize,
}

fn proposal_signal(lead: &Lead, previous: LeadStatus) {
    if lead.status == LeadStatus::Qualified && previous != LeadStatus::Qualified {
        tracing::info!(
            "📝 Lead {} ({}) qualified, proposal automation signalled",
            lead.id,
            lead.business_name
        );
    }
}

pub struct LeadNurturer {
    store: Arc<dyn CollectionStore>,
    outbox: Arc<Outbox>,
    clock: Arc<dyn Clock>,
    sequences: Vec<NurturingSequence>,
    on_status_change: StatusHook,
    lock: Mutex<()>,
    dispatch_lock: Mutex<()>,
}

impl LeadNurturer {
    pub fn new(store: Arc<dyn CollectionStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_sequences(store, clock, default_sequences())
    }

    pub fn with_sequences(
        store: Arc<dyn CollectionStore>,
        clock: Arc<dyn Clock>,
        sequences: Vec<NurturingSequence>,
    ) -> Self {
        Self {
            outbox: Arc::new(Outbox::new(store.clone())),
            store,
            clock,
            sequences,
            on_status_change: Box::new(proposal_signal),
            lock: Mutex::new(()),
            dispatch_lock: Mutex::new(()),
        }
    }

    /// Replace the status hook. The built-in proposal signal is dropped.
    pub fn set_on_status_change<F>(&mut self, hook: F)
    where
        F: Fn(&Lead, LeadStatus) + Send + Sync + 'static,
    {
        self.on_status_change = Box::new(hook);
    }

    pub fn outbox(&self) -> Arc<Outbox> {
        self.outbox.clone()
    }

    pub fn sequences(&self) -> &[NurturingSequence] {
        &self.sequences
    }

    fn load(&self) -> Result<Vec<Lead>> {
        store::load(self.store.as_ref(), collections::LEADS)
    }

    fn save(&self, leads: &[Lead]) -> Result<()> {
        store::save(self.store.as_ref(), collections::LEADS, leads)
    }

    /// Load, mutate one lead, save. Serialised by the repository lock.
    async fn modify<F, T>(&self, lead_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Lead) -> T,
    {
        let _guard = self.lock.lock().await;
        let mut leads = self.load()?;
        let lead = leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| BizAuditError::NotFound(format!("lead '{lead_id}'")))?;
        let out = f(lead);
        self.save(&leads)?;
        Ok(out)
    }

    pub async fn get(&self, lead_id: &str) -> Result<Option<Lead>> {
        Ok(self.load()?.into_iter().find(|l| l.id == lead_id))
    }

    async fn require(&self, lead_id: &str) -> Result<Lead> {
        self.get(lead_id)
            .await?
            .ok_or_else(|| BizAuditError::NotFound(format!("lead '{lead_id}'")))
    }

    pub async fn list(&self, status: Option<LeadStatus>) -> Result<Vec<Lead>> {
        let leads = self.load()?;
        Ok(match status {
            Some(s) => leads.into_iter().filter(|l| l.status == s).collect(),
            None => leads,
        })
    }

    /// Score, tag and persist a new lead, then start matching sequences.
    pub async fn add_lead(&self, data: NewLead) -> Result<Lead> {
        data.validate()?;
        let now = self.clock.now();
        let lead = Lead {
            id: uuid::Uuid::new_v4().to_string(),
            score: scoring::initial_score(data.company_size, &data.source, &data.challenges),
            tags: scoring::initial_tags(data.company_size, &data.source, &data.challenges),
            email: data.email.trim().to_string(),
            business_name: data.business_name,
            contact_name: data.contact_name,
            company_size: data.company_size,
            source: data.source,
            challenges: data.challenges,
            status: LeadStatus::New,
            interactions: Vec::new(),
            nurturing_stage: NurturingStage::Awareness,
            automation_triggers: Default::default(),
            created_at: now,
            updated_at: now,
        };

        {
            let _guard = self.lock.lock().await;
            let mut leads = self.load()?;
            leads.push(lead.clone());
            self.save(&leads)?;
        }
        tracing::info!(
            "🎯 New lead {} ({}) score={}",
            lead.id,
            lead.business_name,
            lead.score
        );

        self.evaluate_triggers(&lead.id).await?;
        self.require(&lead.id).await
    }

    /// Start every matching sequence not yet started for the lead.
    /// Returns the ids started by this call.
    ///
    /// Emails are queued before the lead records the sequence as started, so a
    /// failed enqueue leaves the sequence eligible for the next evaluation.
    pub async fn evaluate_triggers(&self, lead_id: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        let _guard = self.lock.lock().await;
        let mut leads = self.load()?;
        let lead = leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| BizAuditError::NotFound(format!("lead '{lead_id}'")))?;
        if lead.status.is_closed() {
            return Ok(Vec::new());
        }

        let fields = lead.fields();
        let started: Vec<&NurturingSequence> = self
            .sequences
            .iter()
            .filter(|s| !lead.automation_triggers.contains(&s.id) && s.matches(&fields))
            .collect();
        if started.is_empty() {
            return Ok(Vec::new());
        }

        let emails: Vec<_> = started
            .iter()
            .flat_map(|seq| seq.schedule_for(lead, now))
            .collect();
        self.outbox.enqueue(&emails).await?;

        for seq in &started {
            lead.automation_triggers.insert(seq.id.clone());
            tracing::info!(
                "📨 Sequence '{}' started for lead {} ({} email(s))",
                seq.id,
                lead.id,
                seq.emails.len()
            );
        }
        lead.updated_at = now;
        let ids = started.iter().map(|s| s.id.clone()).collect();
        self.save(&leads)?;
        Ok(ids)
    }

    /// Append an interaction and bump the score (capped).
    pub async fn record_interaction(&self, lead_id: &str, kind: &str, metadata: Value) -> Result<Lead> {
        if kind.trim().is_empty() {
            return Err(BizAuditError::Validation("Interaction type is required".into()));
        }
        let now = self.clock.now();
        let lead = self
            .modify(lead_id, |lead| {
                lead.interactions.push(Interaction {
                    kind: kind.to_string(),
                    timestamp: now,
                    metadata,
                });
                lead.score = scoring::apply_interaction(lead.score, kind);
                lead.updated_at = now;
                lead.clone()
            })
            .await?;
        tracing::debug!("Lead {} interaction '{}' score={}", lead.id, kind, lead.score);
        Ok(lead)
    }

    /// Set the status, move the stage with it, then run the status hook.
    pub async fn update_lead_status(&self, lead_id: &str, status: LeadStatus) -> Result<Lead> {
        let now = self.clock.now();
        let (lead, previous) = self
            .modify(lead_id, |lead| {
                let previous = lead.status;
                lead.status = status;
                if let Some(stage) = status.stage() {
                    lead.nurturing_stage = stage;
                }
                lead.updated_at = now;
                (lead.clone(), previous)
            })
            .await?;
        tracing::info!(
            "🔄 Lead {} status {} → {}",
            lead.id,
            previous.as_str(),
            lead.status.as_str()
        );
        (self.on_status_change)(&lead, previous);
        Ok(lead)
    }

    /// Send every due pending email. Emails of closed leads are marked failed.
    pub async fn dispatch_due_emails(&self, sender: &dyn EmailSender) -> Result<DispatchReport> {
        let _guard = self.dispatch_lock.lock().await;
        let now = self.clock.now();
        let due = self.outbox.due(now).await?;
        if due.is_empty() {
            return Ok(DispatchReport::default());
        }

        let leads: BTreeMap<String, Lead> = self
            .load()?
            .into_iter()
            .map(|l| (l.id.clone(), l))
            .collect();

        let mut report = DispatchReport::default();
        for email in due {
            let outcome = match leads.get(&email.lead_id) {
                None => Err(format!("lead '{}' no longer exists", email.lead_id)),
                Some(lead) if lead.status.is_closed() => {
                    Err(format!("lead is {}", lead.status.as_str()))
                }
                Some(_) => sender
                    .send(&OutgoingEmail {
                        to: email.to.clone(),
                        subject: email.subject.clone(),
                        body: email.body.clone(),
                    })
                    .await
                    .map_err(|e| e.to_string()),
            };
            if let Err(reason) = &outcome {
                tracing::warn!("⚠️ Email {} to {} not sent: {}", email.id, email.to, reason);
            }
            let finished = self.outbox.finish(&email.id, outcome, now).await?;
            match finished.status {
                EmailStatus::Sent => report.sent += 1,
                _ => report.failed += 1,
            }
        }
        tracing::info!(
            "📤 Email queue via {}: {} sent, {} failed",
            sender.name(),
            report.sent,
            report.failed
        );
        Ok(report)
    }

    pub async fn stats(&self) -> Result<NurtureStats> {
        let leads = self.load()?;
        let mut stats = NurtureStats {
            total: leads.len(),
            ..Default::default()
        };
        for lead in &leads {
            *stats.by_status.entry(lead.status.as_str().to_string()).or_default() += 1;
            *stats
                .by_stage
                .entry(lead.nurturing_stage.as_str().to_string())
                .or_default() += 1;
        }
        if !leads.is_empty() {
            let sum: u64 = leads.iter().map(|l| u64::from(l.score)).sum();
            stats.average_score = sum as f64 / leads.len() as f64;
        }
        stats.pending_emails = self.outbox.list(Some(EmailStatus::Pending)).await?.len();
        Ok(stats)
    }
}
