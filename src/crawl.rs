use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use indicatif::ProgressBar;
use scraper::{Html, Selector};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::FetchError;
use crate::extract::extract_character;
use crate::record::CharacterRecord;
use crate::validate;

static MEMBER_LINK_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.category-page__members a.category-page__member-link").unwrap()
});
static NEXT_PAGE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.category-page__pagination-next").unwrap());

/// Anything that can hand back the HTML of a page.
pub trait PageSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Collection a listing page belongs to, carried down to its detail pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLabel {
    /// Raw subdomain, e.g. `dr-stone`.
    pub fandom: String,
    /// Human-readable form, e.g. `dr stone`.
    pub collection: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Listing { url: String },
    Detail { url: String, group: GroupLabel },
}

impl Task {
    pub fn url(&self) -> &str {
        match self {
            Task::Listing { url } | Task::Detail { url, .. } => url,
        }
    }
}

/// Follow-ups discovered on one listing page.
#[derive(Debug, Default)]
pub struct ListingPlan {
    pub details: Vec<Task>,
    pub next: Option<Task>,
}

/// A fetch that failed, with the reason. The branch behind it is dropped.
#[derive(Debug)]
pub struct FetchFailure {
    pub url: String,
    pub cause: String,
}

#[derive(Debug, Default)]
pub struct CrawlReport {
    pub records: Vec<CharacterRecord>,
    pub failures: Vec<FetchFailure>,
    pub pages_fetched: usize,
    pub rejected: usize,
}

pub struct CrawlOptions {
    pub concurrency: usize,
    pub allowed_domains: Vec<String>,
    pub max_pages: Option<usize>,
}

/// Derive the group label from a listing URL:
/// `https://dr-stone.fandom.com/...` → `dr-stone` / `dr stone`.
pub fn group_from_url(page_url: &str) -> GroupLabel {
    let fandom = match Url::parse(page_url) {
        Ok(u) => u.host_str().unwrap_or_default().to_string(),
        Err(_) => page_url
            .split("//")
            .nth(1)
            .unwrap_or(page_url)
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string(),
    }
    .split('.')
    .next()
    .unwrap_or_default()
    .to_string();

    GroupLabel {
        collection: fandom.replace('-', " "),
        fandom,
    }
}

/// Member links and the optional next page of a category listing.
pub fn plan_listing(html: &str, page_url: &str) -> ListingPlan {
    let doc = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let group = group_from_url(page_url);

    let details = doc
        .select(&MEMBER_LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve(base.as_ref(), href))
        .map(|url| Task::Detail {
            url,
            group: group.clone(),
        })
        .collect();

    let next = doc
        .select(&NEXT_PAGE_SEL)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve(base.as_ref(), href))
        .map(|url| Task::Listing { url });

    ListingPlan { details, next }
}

fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let resolved = match base {
        Some(b) => b.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    Some(resolved.to_string())
}

/// `true` when `url`'s host is one of `allowed` or a subdomain of it.
/// An empty allow-list admits everything.
pub fn is_allowed(url: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) else {
        return false;
    };
    allowed.iter().any(|domain| {
        let domain = domain.trim().to_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    })
}

/// Work-list driver: pops listing/detail tasks, fetches them through a
/// [`PageSource`] with bounded concurrency, and collects accepted records.
pub struct Crawler<S: PageSource> {
    source: Arc<S>,
    options: CrawlOptions,
    progress: Option<ProgressBar>,
}

impl<S: PageSource> Crawler<S> {
    pub fn new(source: S, options: CrawlOptions) -> Self {
        Crawler {
            source: Arc::new(source),
            options,
            progress: None,
        }
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    pub async fn run(&self, start_urls: &[String]) -> CrawlReport {
        let mut report = CrawlReport::default();
        let mut queue: VecDeque<Task> = VecDeque::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut in_flight: JoinSet<(Task, Result<String, FetchError>)> = JoinSet::new();
        // task id -> url, so a panicked fetch still lands in `failures`
        let mut in_flight_urls: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut scheduled = 0usize;
        let concurrency = self.options.concurrency.max(1);

        for url in start_urls {
            self.enqueue(Task::Listing { url: url.clone() }, &mut queue, &mut seen);
        }

        loop {
            while in_flight.len() < concurrency {
                let Some(task) = queue.pop_front() else { break };
                if self.options.max_pages.is_some_and(|max| scheduled >= max) {
                    debug!("Page limit reached, dropping {}", task.url());
                    queue.clear();
                    break;
                }
                scheduled += 1;
                let url = task.url().to_string();
                let source = Arc::clone(&self.source);
                let handle = in_flight.spawn(async move {
                    let result = source.fetch(task.url()).await;
                    (task, result)
                });
                in_flight_urls.insert(handle.id(), url);
            }

            let Some(joined) = in_flight.join_next_with_id().await else {
                break;
            };

            report.pages_fetched += 1;
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }

            let (task, result) = match joined {
                Ok((id, pair)) => {
                    in_flight_urls.remove(&id);
                    pair
                }
                Err(e) => {
                    let url = in_flight_urls.remove(&e.id()).unwrap_or_default();
                    warn!("Fetch task for {} panicked: {}", url, e);
                    report.failures.push(FetchFailure {
                        url,
                        cause: format!("fetch task panicked: {}", e),
                    });
                    continue;
                }
            };

            let body = match result {
                Ok(body) => body,
                Err(e) => {
                    warn!("Fetch failed for {}: {}", task.url(), e);
                    report.failures.push(FetchFailure {
                        url: e.url().to_string(),
                        cause: e.to_string(),
                    });
                    continue;
                }
            };

            match task {
                Task::Listing { url } => {
                    let plan = plan_listing(&body, &url);
                    debug!(
                        "Listing {}: {} members, next page: {}",
                        url,
                        plan.details.len(),
                        plan.next.is_some()
                    );
                    for detail in plan.details {
                        self.enqueue(detail, &mut queue, &mut seen);
                    }
                    if let Some(next) = plan.next {
                        self.enqueue(next, &mut queue, &mut seen);
                    }
                }
                Task::Detail { url, group } => {
                    let record = extract_character(&body, &url, &group, Utc::now());
                    if validate::accept(&record) {
                        report.records.push(record);
                    } else {
                        debug!("Rejected incomplete record from {}", url);
                        report.rejected += 1;
                    }
                }
            }
        }

        info!(
            "Crawl finished: {} pages, {} records, {} rejected, {} failures",
            report.pages_fetched,
            report.records.len(),
            report.rejected,
            report.failures.len()
        );
        report
    }

    fn enqueue(&self, task: Task, queue: &mut VecDeque<Task>, seen: &mut HashSet<String>) {
        if !is_allowed(task.url(), &self.options.allowed_domains) {
            debug!("Offsite link skipped: {}", task.url());
            return;
        }
        if seen.insert(task.url().to_string()) {
            queue.push_back(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::record::{Gender, Status};

    const START: &str = "https://dr-stone.fandom.com/wiki/Category:Characters";
    const PAGE2: &str = "https://dr-stone.fandom.com/wiki/Category:Characters?from=L";

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    /// Serves fixtures by URL and remembers every request.
    struct FixtureSource {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl FixtureSource {
        fn new(pages: &[(&str, String)]) -> Self {
            FixtureSource {
                pages: pages.iter().map(|(u, b)| (u.to_string(), b.clone())).collect(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl PageSource for Arc<FixtureSource> {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn options() -> CrawlOptions {
        CrawlOptions {
            concurrency: 4,
            allowed_domains: vec!["fandom.com".into()],
            max_pages: None,
        }
    }

    #[test]
    fn group_label_from_host() {
        let g = group_from_url("https://watashi-ga-motete-dousunda.fandom.com/wiki/Category:Characters");
        assert_eq!(g.fandom, "watashi-ga-motete-dousunda");
        assert_eq!(g.collection, "watashi ga motete dousunda");
        assert_eq!(group_from_url("not a url//nana.fandom.com/x").fandom, "nana");
    }

    #[test]
    fn listing_plan_resolves_links() {
        let plan = plan_listing(&fixture("listing_page1"), START);
        let urls: Vec<&str> = plan.details.iter().map(Task::url).collect();
        assert_eq!(
            urls,
            vec![
                "https://dr-stone.fandom.com/wiki/Senku_Ishigami",
                "https://dr-stone.fandom.com/wiki/Byakuya_Ishigami",
                "https://www.example.org/wiki/Offsite",
            ]
        );
        if let Task::Detail { group, .. } = &plan.details[0] {
            assert_eq!(group.collection, "dr stone");
        } else {
            panic!("expected detail task");
        }
        assert_eq!(plan.next, Some(Task::Listing { url: PAGE2.into() }));
    }

    #[test]
    fn last_listing_page_has_no_next() {
        let plan = plan_listing(&fixture("listing_page2"), PAGE2);
        assert_eq!(plan.details.len(), 3);
        assert!(plan.next.is_none());
    }

    #[test]
    fn offsite_filter() {
        let allowed = vec!["fandom.com".to_string()];
        assert!(is_allowed("https://nana.fandom.com/wiki/Nana", &allowed));
        assert!(!is_allowed("https://www.example.org/wiki/Offsite", &allowed));
        assert!(!is_allowed("https://notfandom.com/", &allowed));
        assert!(is_allowed("https://www.example.org/", &[]));
    }

    #[tokio::test]
    async fn crawl_follows_pagination_and_reports_failures() {
        let source = Arc::new(FixtureSource::new(&[
            (START, fixture("listing_page1")),
            (PAGE2, fixture("listing_page2")),
            ("https://dr-stone.fandom.com/wiki/Senku_Ishigami", fixture("senku")),
            ("https://dr-stone.fandom.com/wiki/Lillian_Weinberg", fixture("mixed_layout")),
            ("https://dr-stone.fandom.com/wiki/Nameless", "<html><body></body></html>".into()),
        ]));
        let crawler = Crawler::new(Arc::clone(&source), options());
        let report = crawler.run(&[START.to_string()]).await;

        let mut names: Vec<&str> = report.records.iter().filter_map(|r| r.name.as_deref()).collect();
        names.sort();
        assert_eq!(names, vec!["Lillian Weinberg", "Senku Ishigami"]);

        let lillian = report
            .records
            .iter()
            .find(|r| r.source_url.ends_with("Lillian_Weinberg"))
            .unwrap();
        assert_eq!(lillian.gender, Gender::Female);
        assert_eq!(lillian.status, Status::Deceased);
        assert_eq!(lillian.source_collection.as_deref(), Some("dr stone"));

        // Byakuya is not served by the fixture source
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].url.ends_with("Byakuya_Ishigami"));
        assert_eq!(report.rejected, 1);

        // Senku is linked from both pages but fetched once; the offsite link never
        let requests = source.requests.lock().unwrap();
        assert_eq!(requests.iter().filter(|u| u.ends_with("Senku_Ishigami")).count(), 1);
        assert!(!requests.iter().any(|u| u.contains("example.org")));
        assert_eq!(report.pages_fetched, requests.len());
        assert_eq!(report.pages_fetched, 6);
    }

    #[tokio::test]
    async fn failed_listing_ends_branch() {
        let source = Arc::new(FixtureSource::new(&[]));
        let crawler = Crawler::new(Arc::clone(&source), options());
        let report = crawler.run(&[START.to_string()]).await;
        assert!(report.records.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(source.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn max_pages_bounds_the_crawl() {
        let source = Arc::new(FixtureSource::new(&[
            (START, fixture("listing_page1")),
            (PAGE2, fixture("listing_page2")),
        ]));
        let crawler = Crawler::new(
            Arc::clone(&source),
            CrawlOptions {
                max_pages: Some(2),
                concurrency: 1,
                ..options()
            },
        );
        let report = crawler.run(&[START.to_string()]).await;
        assert_eq!(report.pages_fetched, 2);
    }

    struct PanickingSource;

    impl PageSource for PanickingSource {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            panic!("parser blew up on {}", url)
        }
    }

    #[tokio::test]
    async fn panicked_fetch_is_reported_with_its_url() {
        let crawler = Crawler::new(PanickingSource, options());
        let report = crawler.run(&[START.to_string()]).await;
        assert!(report.records.is_empty());
        assert_eq!(report.pages_fetched, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].url, START);
        assert!(report.failures[0].cause.contains("panicked"));
    }
}
