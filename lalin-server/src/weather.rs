/**
 * WEATHER - Bulletin nowcast BMKG (mode `weather` du serveur)
 *
 * RÔLE : Source du bulletin diffusé en mode météo. Pas de cible ni de
 * pilotage : les abonnés font JOIN, puis reçoivent un bulletin par période.
 *
 * EXTRACTION :
 * - premier <p> de plus de 20 caractères dans div.col-md-12 (sinon div.container)
 * - à défaut, le <title> de la page ("Peringatan Dini Cuaca" si absent)
 */

use crate::config::WeatherConf;
use crate::models::Bulletin;
use crate::provider::ProviderError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

const MIN_PARAGRAPH_CHARS: usize = 20;
const DEFAULT_HEADLINE: &str = "Peringatan Dini Cuaca";

#[async_trait]
pub trait BulletinSource: Send + Sync {
    async fn fetch_bulletin(&self) -> Result<Bulletin, ProviderError>;
}

pub struct BmkgProvider {
    client: Client,
    url: Url,
}

impl BmkgProvider {
    pub fn new(conf: &WeatherConf, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("Mozilla/5.0 (lalin-server/", env!("CARGO_PKG_VERSION"), ")"))
            .build()?;
        let url = Url::parse(&conf.url)
            .map_err(|e| ProviderError::Upstream(format!("invalid weather url: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl BulletinSource for BmkgProvider {
    async fn fetch_bulletin(&self) -> Result<Bulletin, ProviderError> {
        debug!(url = %self.url, "bmkg request");
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }
        let page = response.text().await?;
        extract_bulletin(&page)
    }
}

fn selector(css: &str) -> Result<Selector, ProviderError> {
    Selector::parse(css).map_err(|e| ProviderError::Upstream(format!("bad selector '{css}': {e:?}")))
}

/// Texte d'un élément, espaces (retours à la ligne compris) normalisés.
fn element_text(element: scraper::ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extrait le bulletin d'une page nowcast BMKG.
pub fn extract_bulletin(page: &str) -> Result<Bulletin, ProviderError> {
    let document = Html::parse_document(page);
    let primary = selector("div.col-md-12")?;
    let fallback = selector("div.container")?;
    let paragraph = selector("p")?;
    let title = selector("title")?;

    let main = document
        .select(&primary)
        .next()
        .or_else(|| document.select(&fallback).next());
    if let Some(main) = main {
        let nowcast = main
            .select(&paragraph)
            .map(element_text)
            .find(|text| text.chars().count() > MIN_PARAGRAPH_CHARS);
        if let Some(text) = nowcast {
            return Ok(Bulletin::Nowcast(text));
        }
    }

    let headline = document
        .select(&title)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| DEFAULT_HEADLINE.to_string());
    Ok(Bulletin::Headline(headline))
}
