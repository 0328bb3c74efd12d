//! Run Orchestrator: the per-run pipeline that ties the
//! Rubric Extractor, Batch Planner, Oracle Client, Decision Store and
//! Label Reconciler together into one `run()` call.
//!
//! Sequential by design: one rubric at a time, one batch at a
//! time, so the oracle's per-account rate limit is the only bottleneck
//! and checkpointing stays simple.

use std::collections::HashMap;

use chrono::Utc;

use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::error::Result;
use crate::model::{CategorySummary, Decision, Movie, RunSummary};
use crate::oracle::{OracleClient, OracleRequest};
use crate::planner;
use crate::reconcile::{self, Action};
use crate::store::DecisionStore;

#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub category_filter: Option<String>,
    pub force_refresh: bool,
    pub dry_run: bool,
    pub batch_size: Option<usize>,
}

pub async fn run(
    config: &Config,
    store: &mut DecisionStore,
    catalog: &dyn CatalogClient,
    oracle: &dyn OracleClient,
    opts: RunOptions,
) -> Result<RunSummary> {
    store.begin_run();
    let started_at = Utc::now();

    let rubric_dir = std::path::Path::new(&config.rubric_dir);
    let extraction = crate::rubric::extract_dir(rubric_dir, config.fix_tags)?;
    for diagnostic in &extraction.diagnostics {
        store.log_error(
            "rubric_extraction",
            &format!("{}: {}", diagnostic.file, diagnostic.message),
        );
    }

    let mut rubrics: Vec<_> = extraction
        .rubrics
        .into_iter()
        .filter(|r| r.enabled)
        .filter(|r| opts.category_filter.as_deref().map(|f| f == r.name).unwrap_or(true))
        .collect();
    rubrics = planner::order_rubrics(rubrics);

    let mut movies = catalog.list_movies().await?;
    let mut label_ids: HashMap<String, i64> =
        catalog.list_labels().await?.into_iter().map(|l| (l.name, l.id)).collect();

    let batch_size = opts.batch_size.unwrap_or(config.batch_size);
    let mut categories = Vec::with_capacity(rubrics.len());

    for rubric in &rubrics {
        let mut summary = CategorySummary { category: rubric.name.clone(), ..Default::default() };

        let plan = planner::plan(rubric, &movies, store, batch_size, opts.force_refresh);
        summary.reused = plan.reuse.len();

        let mut fresh_decisions: Vec<Decision> = Vec::new();

        for batch in &plan.reask_batches {
            match oracle.classify(OracleRequest { rubric, movies: batch, detailed: false }).await {
                Ok(reply) => {
                    summary.usage.accumulate(reply.usage);
                    summary.asked += batch.len();
                    for oracle_decision in reply.decisions {
                        let Some(movie) = batch.iter().find(|m| m.id == oracle_decision.movie_id) else {
                            continue;
                        };
                        let decision = Decision {
                            movie_id: movie.id,
                            category_name: rubric.name.clone(),
                            include: oracle_decision.include,
                            confidence: oracle_decision.confidence,
                            fingerprint: crate::fingerprint::compute(movie),
                            label: rubric.expected_label(),
                            timestamp: Utc::now(),
                            reasoning: oracle_decision.reasoning,
                            detailed_analysis: None,
                        };
                        store.set_decision(decision.clone());
                        fresh_decisions.push(decision);
                    }
                }
                Err(e) => {
                    store.log_error(&format!("oracle:{}", rubric.name), &e.to_string());
                    summary.errors.push(e.to_string());
                }
            }
            // Checkpoint at every batch boundary.
            store.save()?;
        }

        if rubric.use_refinement {
            let refine_ids: Vec<i64> = planner::needs_refinement(rubric, &fresh_decisions)
                .into_iter()
                .map(|d| d.movie_id)
                .collect();
            for movie_id in refine_ids {
                let Some(movie) = movies.iter().find(|m| m.id == movie_id) else { continue };
                let single = [movie.clone()];
                match oracle.classify(OracleRequest { rubric, movies: &single, detailed: true }).await {
                    Ok(reply) => {
                        summary.usage.accumulate(reply.usage);
                        if let Some(refined) = reply.decisions.into_iter().find(|d| d.movie_id == movie_id) {
                            if let Some(decision) = fresh_decisions.iter_mut().find(|d| d.movie_id == movie_id) {
                                decision.confidence = refined.confidence;
                                decision.include = refined.include;
                                decision.detailed_analysis = refined.reasoning.clone();
                                decision.reasoning = refined.reasoning;
                                store.set_decision(decision.clone());
                            }
                        }
                    }
                    Err(e) => {
                        store.log_error(&format!("refinement:{}", rubric.name), &e.to_string());
                        summary.errors.push(e.to_string());
                    }
                }
            }
            store.save()?;
        }

        let mut all_decisions = plan.reuse.clone();
        all_decisions.extend(fresh_decisions);

        let reconciliations = reconcile::plan_reconciliation(rubric, &movies, &all_decisions)?;
        for reconciliation in reconciliations {
            let Some(movie) = movies.iter_mut().find(|m| m.id == reconciliation.movie_id) else { continue };

            if !opts.dry_run {
                let label_id = match label_ids.get(&reconciliation.label) {
                    Some(id) => *id,
                    None => {
                        let created = catalog.create_label(&reconciliation.label).await?;
                        label_ids.insert(created.name.clone(), created.id);
                        created.id
                    }
                };
                let mut ids: Vec<i64> = movie
                    .labels
                    .iter()
                    .filter_map(|name| label_ids.get(name).copied())
                    .collect();
                match reconciliation.action {
                    Action::Add => ids.push(label_id),
                    Action::Remove => ids.retain(|id| *id != label_id),
                    Action::NoOp => unreachable!(),
                }
                ids.sort_unstable();
                ids.dedup();
                catalog.update_movie_labels(movie.id, &ids).await?;
            }

            match reconciliation.action {
                Action::Add => {
                    movie.labels.insert(reconciliation.label.clone());
                    summary.added.push(movie.title.clone());
                }
                Action::Remove => {
                    movie.labels.remove(&reconciliation.label);
                    summary.removed.push(movie.title.clone());
                }
                Action::NoOp => unreachable!(),
            }
            let entry = reconcile::change_log_entry(movie, &rubric.name, &reconciliation);
            store.log_change(entry);
        }

        categories.push(summary);
    }

    store.save()?;

    let total_usage = categories.iter().fold(Default::default(), |mut acc: crate::model::UsageRecord, c| {
        acc.accumulate(c.usage);
        acc
    });

    Ok(RunSummary {
        started_at: Some(started_at),
        finished_at: Some(Utc::now()),
        dry_run: opts.dry_run,
        categories,
        total_usage,
        errors: store.run_errors().to_vec(),
    })
}
