//! GitHub Actions `workflow_dispatch` client.
//!
//! The HTTP side is async (`reqwest`); [`BlockingWorkflows`] drives it from
//! the sequential remediator on a private current-thread runtime.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::config::CiConfig;

use super::{RunStatus, WorkflowRun, WorkflowTrigger};

const USER_AGENT: &str = concat!("stagehand/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct RunList {
    #[serde(default)]
    workflow_runs: Vec<RunInfo>,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    id: u64,
    html_url: String,
    status: Option<String>,
    conclusion: Option<String>,
}

impl RunInfo {
    fn status(&self) -> RunStatus {
        match self.status.as_deref() {
            Some("completed") => match self.conclusion.as_deref() {
                Some("success") => RunStatus::Succeeded,
                other => RunStatus::Failed {
                    conclusion: other.unwrap_or("unknown").to_string(),
                },
            },
            Some("queued" | "requested" | "waiting" | "pending") | None => RunStatus::Queued,
            Some(_) => RunStatus::InProgress,
        }
    }
}

pub struct GitHubActionsClient {
    http: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    git_ref: String,
    token: String,
    discovery_attempts: u32,
    discovery_delay: Duration,
}

impl GitHubActionsClient {
    pub fn new(ci: &CiConfig, token: impl Into<String>) -> Result<Self> {
        let (owner, repo) = ci.owner_repo()?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base: ci.api_url.as_str().trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            git_ref: ci.git_ref.clone(),
            token: token.into(),
            discovery_attempts: 10,
            discovery_delay: Duration::from_secs(3),
        })
    }

    /// How long to look for the run a dispatch created.
    pub fn with_discovery(mut self, attempts: u32, delay: Duration) -> Self {
        self.discovery_attempts = attempts.max(1);
        self.discovery_delay = delay;
        self
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .bearer_auth(&self.token)
    }

    async fn api_get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("{url} returned HTTP {}", status.as_u16());
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("invalid JSON from {url}"))
    }

    /// Newest `workflow_dispatch` run id, if any.
    #[instrument(skip(self))]
    pub async fn latest_run_id(&self, workflow: &str) -> Result<Option<u64>> {
        let url = self.repo_url(&format!(
            "actions/workflows/{workflow}/runs?event=workflow_dispatch&per_page=20"
        ));
        let list: RunList = self.api_get(&url).await?;
        Ok(list.workflow_runs.iter().map(|r| r.id).max())
    }

    #[instrument(skip(self, inputs))]
    pub async fn dispatch(&self, workflow: &str, inputs: &BTreeMap<String, String>) -> Result<()> {
        let url = self.repo_url(&format!("actions/workflows/{workflow}/dispatches"));
        let body = json!({ "ref": self.git_ref, "inputs": inputs });
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("{url} returned HTTP {}: {}", status.as_u16(), text.trim());
        }
        Ok(())
    }

    /// Dispatch the workflow and locate the run it created.
    #[instrument(skip(self, inputs))]
    pub async fn trigger(
        &self,
        workflow: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<WorkflowRun> {
        let baseline = self.latest_run_id(workflow).await?.unwrap_or(0);
        self.dispatch(workflow, inputs).await?;

        let url = self.repo_url(&format!(
            "actions/workflows/{workflow}/runs?event=workflow_dispatch&per_page=20"
        ));
        for attempt in 1..=self.discovery_attempts {
            let list: RunList = self.api_get(&url).await?;
            if let Some(run) = list
                .workflow_runs
                .into_iter()
                .filter(|r| r.id > baseline)
                .min_by_key(|r| r.id)
            {
                tracing::info!(run_id = run.id, url = %run.html_url, "workflow run started");
                return Ok(WorkflowRun {
                    id: run.id,
                    url: run.html_url,
                });
            }
            tracing::debug!(attempt, "dispatched run not listed yet");
            tokio::time::sleep(self.discovery_delay).await;
        }
        bail!(
            "workflow {} was dispatched but no new run appeared in {}/{}",
            workflow,
            self.owner,
            self.repo
        )
    }

    #[instrument(skip(self))]
    pub async fn run_status(&self, run_id: u64) -> Result<RunStatus> {
        let url = self.repo_url(&format!("actions/runs/{run_id}"));
        let run: RunInfo = self.api_get(&url).await?;
        Ok(run.status())
    }
}

/// Synchronous [`WorkflowTrigger`] over the async client.
pub struct BlockingWorkflows {
    client: GitHubActionsClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingWorkflows {
    pub fn new(client: GitHubActionsClient) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create async runtime")?;
        Ok(Self { client, runtime })
    }
}

impl WorkflowTrigger for BlockingWorkflows {
    fn trigger(&self, workflow: &str, inputs: &BTreeMap<String, String>) -> Result<WorkflowRun> {
        self.runtime.block_on(self.client.trigger(workflow, inputs))
    }

    fn poll_status(&self, run: &WorkflowRun) -> Result<RunStatus> {
        self.runtime.block_on(self.client.run_status(run.id))
    }
}
