//! Shared fixtures: a fast test configuration and HTML pages in the
//! layout of the council website

use council_harvest::config::{Config, OutputConfig, ThrottleConfig};
use council_harvest::crawler::{Orchestrator, RunContext, RunSummary};
use council_harvest::storage::{share, SqliteStorage};
use council_harvest::RunMode;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::ResponseTemplate;

/// Configuration pointing at `base_url` with every delay disabled
pub fn test_config(base_url: &str, dir: &Path) -> Config {
    let mut config = Config::default();
    config.source.base_url = base_url.to_string();
    config.throttle = ThrottleConfig {
        request_delay_ms: 0,
        batch_delay_ms: 0,
        document_delay_ms: 0,
        max_retries: 1,
        retry_delay_ms: 10,
    };
    config.collection.flush_threshold = 2;
    config.output = OutputConfig {
        database_path: dir.join("council.db").to_string_lossy().into_owned(),
        image_dir: dir.join("img").to_string_lossy().into_owned(),
        metrics_dir: dir.join("data").to_string_lossy().into_owned(),
        report_path: String::new(),
    };
    config
}

pub fn open_storage(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.output.database_path)).unwrap()
}

/// Runs one orchestrator against the configured database
pub async fn run_mode(
    config: &Config,
    mode: RunMode,
) -> (Orchestrator, council_harvest::Result<RunSummary>) {
    run_mode_with_cancel(config, mode, CancellationToken::new()).await
}

pub async fn run_mode_with_cancel(
    config: &Config,
    mode: RunMode,
    cancel: CancellationToken,
) -> (Orchestrator, council_harvest::Result<RunSummary>) {
    let storage = share(open_storage(config));
    let ctx = RunContext::new(config.clone(), "test-hash");
    let mut orchestrator = Orchestrator::new(ctx, storage, cancel).unwrap();
    let result = orchestrator.run(mode).await;
    (orchestrator, result)
}

/// Token that trips by itself after `after`
pub fn cancel_after(after: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let trip = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trip.cancel();
    });
    token
}

pub fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body.into())
}

/// Members page; each member is `(full name, political name, party, id)`
pub fn members_page(members: &[(&str, &str, &str, u32)], with_photos: bool) -> String {
    let mut body = String::from("<html><body><div class=\"row\">");
    for (full, political, party, id) in members {
        if with_photos {
            body.push_str(&format!(
                r#"<div class="col-md-3"><div class="img"><img src="img/vereador{id}.jpg" alt="{full} - {political}"></div></div>"#
            ));
        }
        body.push_str(&format!(
            r#"<div><h2><a href="/Vereador/{id}">{full} - {political}</a></h2>
               <span><ul><li><a href="/partido/{party}">{party}</a></li></ul></span></div>"#
        ));
    }
    body.push_str("</div></body></html>");
    body
}

/// Profile page with a documents table; rows are `(category, [count per year])`
pub fn profile_page(years: &[&str], rows: &[(&str, &[&str])]) -> String {
    let mut body = String::from("<html><body><table><caption>Documentos</caption><thead><tr><th>Tipo</th>");
    for year in years {
        body.push_str(&format!(r#"<th class="text-right">{year}</th>"#));
    }
    body.push_str(r#"<th class="text-right">Total</th></tr></thead><tbody>"#);
    for (category, counts) in rows {
        body.push_str(&format!("<tr><td>{category}</td>"));
        for count in counts.iter() {
            body.push_str(&format!("<td>{count}</td>"));
        }
        body.push_str("<td>0</td></tr>");
    }
    body.push_str("</tbody></table></body></html>");
    body
}

/// Detail index page; entries are `(political name, listing path)`
pub fn index_page(entries: &[(&str, &str)]) -> String {
    let mut body = String::from("<html><body>");
    for (name, listing) in entries {
        body.push_str(&format!(
            r#"<div class="data-list-item data-list-striped data-list-hover">
                 <h4>{name}</h4>
                 <a href="{listing}">Proposituras Detalhadas</a>
               </div>"#
        ));
    }
    body.push_str("</body></html>");
    body
}

/// Listing page with one category block holding `links`
pub fn listing_page(category: &str, links: &[&str]) -> String {
    let mut body = format!(
        r#"<html><body><div class="data-list-item data-list-striped data-list-hover"><h3>{category}</h3>"#
    );
    for link in links {
        body.push_str(&format!(r#"<p><a href="{link}">{link}</a></p>"#));
    }
    body.push_str("</div></body></html>");
    body
}

pub fn document_page(status: &str, date: &str) -> String {
    format!(
        "<html><body><div class=\"info\">\
         <p><strong>Situação:</strong> {status}</p>\
         <p><strong>Data:</strong> {date}</p>\
         </div></body></html>"
    )
}
