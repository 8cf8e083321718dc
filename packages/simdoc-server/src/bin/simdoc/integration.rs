//! End-to-end scenarios driven against a running deployment over HTTP.
//!
//! Requires the API server and at least one worker to be running; every
//! scenario uses run-unique ids and content so repeated runs never collide
//! with earlier data.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::info;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Runs the scenario suite, then submits any fixture assets.
pub async fn run(
    base_url: &str,
    settle_timeout: Duration,
    assets_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let client = Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;
    let base = base_url.trim_end_matches('/');
    let nonce = Uuid::new_v4().simple().to_string();

    let mut failures = 0;
    for (name, result) in [
        (
            "exact-duplicate fast path",
            exact_duplicate_scenario(&client, base, &nonce, settle_timeout).await,
        ),
        (
            "near-duplicate slow path",
            near_duplicate_scenario(&client, base, &nonce, settle_timeout).await,
        ),
        (
            "unique article",
            unique_scenario(&client, base, &nonce, settle_timeout).await,
        ),
    ] {
        match result {
            Ok(()) => println!("PASS {name}"),
            Err(err) => {
                failures += 1;
                println!("FAIL {name}: {err:#}");
            }
        }
    }

    if let Some(dir) = assets_dir {
        submit_assets(&client, base, dir).await?;
    }

    if failures > 0 {
        bail!("{failures} scenario(s) failed");
    }
    println!("all scenarios passed");
    Ok(())
}

fn payload(article_id: &str, title: &str, content: &str) -> Value {
    json!({
        "article_id": article_id,
        "title": title,
        "content": content,
        "publish_time": Utc::now().to_rfc3339(),
        "source": "integration",
        "state": 1,
        "top": 0,
        "tags": [],
        "topic": []
    })
}

async fn submit(client: &Client, base: &str, body: &Value) -> anyhow::Result<()> {
    let response = client
        .post(format!("{base}/api/v1/articles/"))
        .json(body)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        bail!("submit returned {status}: {}", response.text().await?);
    }
    Ok(())
}

/// Polls until the article leaves `pending`, returning its final document.
async fn wait_settled(
    client: &Client,
    base: &str,
    article_id: &str,
    timeout: Duration,
) -> anyhow::Result<Value> {
    let deadline = Instant::now() + timeout;
    loop {
        let response = client
            .get(format!("{base}/api/v1/articles/{article_id}"))
            .send()
            .await?;
        if response.status().is_success() {
            let body: Value = response.json().await?;
            if body["article"]["cluster_status"] != "pending" {
                return Ok(body);
            }
        }
        if Instant::now() >= deadline {
            bail!("article {article_id} did not settle within {timeout:?} (is a worker running?)");
        }
        sleep(POLL_INTERVAL).await;
    }
}

async fn exact_duplicate_scenario(
    client: &Client,
    base: &str,
    nonce: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    let a = format!("it-exact-a-{nonce}");
    let b = format!("it-exact-b-{nonce}");
    let content = format!("A fire broke out in a Tai Po apartment block. run {nonce}");

    submit(client, base, &payload(&a, "Fire", &content)).await?;
    let settled_a = wait_settled(client, base, &a, timeout).await?;
    info!(article = %a, status = %settled_a["article"]["cluster_status"], "first article settled");

    // Identical text: must match synchronously on the fast path.
    submit(client, base, &payload(&b, "Fire", &content)).await?;
    let response = client
        .get(format!("{base}/api/v1/articles/{b}"))
        .send()
        .await?;
    let body: Value = response.json().await?;
    if body["article"]["cluster_status"] != "matched" {
        bail!(
            "duplicate was not matched immediately: {}",
            body["article"]["cluster_status"]
        );
    }
    let cluster_b = body["article"]["cluster_id"].clone();
    if cluster_b.is_null() {
        bail!("duplicate has no cluster id");
    }

    let settled_a = wait_settled(client, base, &a, timeout).await?;
    if settled_a["article"]["cluster_id"] != cluster_b {
        bail!(
            "duplicate pair split across clusters: {} vs {}",
            settled_a["article"]["cluster_id"],
            cluster_b
        );
    }

    let members = &settled_a["cluster"]["article_ids"];
    for id in [&a, &b] {
        if !members
            .as_array()
            .is_some_and(|ids| ids.iter().any(|v| v == id.as_str()))
        {
            bail!("cluster membership is missing {id}");
        }
    }
    Ok(())
}

async fn near_duplicate_scenario(
    client: &Client,
    base: &str,
    nonce: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    let a = format!("it-near-a-{nonce}");
    let b = format!("it-near-b-{nonce}");
    let body_text = format!(
        "A fire broke out in a Tai Po apartment block early this morning and \
         firefighters spent several hours bringing the blaze under control while \
         residents of the surrounding streets were evacuated to shelters. run {nonce}"
    );

    submit(client, base, &payload(&a, "Tai Po apartment fire", &body_text)).await?;
    wait_settled(client, base, &a, timeout).await?;
    submit(client, base, &payload(&b, "Tai Po residential blaze", &body_text)).await?;
    let settled_b = wait_settled(client, base, &b, timeout).await?;

    let cluster_b = settled_b["article"]["cluster_id"].clone();
    if cluster_b.is_null() {
        bail!("near-duplicate did not cluster");
    }
    let settled_a = wait_settled(client, base, &a, timeout).await?;
    if settled_a["article"]["cluster_id"] != cluster_b {
        bail!("near-duplicate pair split across clusters");
    }

    let similar: Value = client
        .get(format!("{base}/api/v1/articles/{b}/similar"))
        .send()
        .await?
        .json()
        .await?;
    let found = similar["articles"]
        .as_array()
        .is_some_and(|entries| entries.iter().any(|entry| entry["article_id"] == a.as_str()));
    if !found {
        bail!("similar listing for {b} does not contain {a}");
    }
    Ok(())
}

async fn unique_scenario(
    client: &Client,
    base: &str,
    nonce: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    let id = format!("it-unique-{nonce}");
    let content = format!(
        "Quarterly earnings at the exchange beat analyst expectations \
         as trading volumes recovered. run {nonce}"
    );
    submit(client, base, &payload(&id, "Markets rally", &content)).await?;
    let settled = wait_settled(client, base, &id, timeout).await?;

    if settled["article"]["cluster_status"] != "unique" {
        bail!(
            "expected unique, got {}",
            settled["article"]["cluster_status"]
        );
    }
    if !settled["article"]["cluster_id"].is_null() {
        bail!("unique article carries a cluster id");
    }

    let response = client
        .get(format!("{base}/api/v1/articles/{id}/similar"))
        .send()
        .await?;
    if response.status().as_u16() != 404 {
        bail!("similar for a unique article should be 404, got {}", response.status());
    }
    let body: Value = response.json().await?;
    if body["error"]["code"] != "CLUSTER_PENDING" {
        bail!("unexpected error code {}", body["error"]["code"]);
    }
    Ok(())
}

/// Submits every `*.json` fixture in `dir` as an `ArticleCreate` payload.
async fn submit_assets(client: &Client, base: &str, dir: &Path) -> anyhow::Result<()> {
    let mut submitted = 0;
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read assets dir {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let body: Value = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        submit(client, base, &body)
            .await
            .with_context(|| format!("failed to submit {}", path.display()))?;
        submitted += 1;
    }
    println!("submitted {submitted} fixture article(s) from {}", dir.display());
    Ok(())
}
