use crate::extract::extract_listing;
use crate::fetch::{validate_url, PageSource};
use crate::media::ImageData;
use crate::models::Listing;

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub max_images: usize,
    /// Download image bytes for the deck.
    pub download_images: bool,
}

/// Fetch and extract every URL, one at a time and in input order. A listing
/// that cannot be fetched becomes a failed record; the batch goes on.
pub async fn scrape_all<S: PageSource + Sync>(
    source: &S,
    urls: &[String],
    options: &ScrapeOptions,
) -> Vec<Listing> {
    let total = urls.len();
    let mut listings = Vec::with_capacity(total);

    for (idx, url) in urls.iter().enumerate() {
        tracing::info!("[{}/{}] {}", idx + 1, total, url);
        let listing = scrape_one(source, url, options).await;
        match &listing.failure {
            Some(reason) => tracing::warn!(url = %url, "listing failed: {}", reason),
            None => tracing::info!(
                "[{}/{}] {} ({} images)",
                idx + 1,
                total,
                if listing.title.is_empty() { "(no title)" } else { listing.title.as_str() },
                listing.images.len()
            ),
        }
        listings.push(listing);
    }

    let failed = listings.iter().filter(|l| l.is_failed()).count();
    tracing::info!("scraped {} listings, {} failed", total - failed, failed);
    listings
}

async fn scrape_one<S: PageSource + Sync>(source: &S, url: &str, options: &ScrapeOptions) -> Listing {
    if let Err(e) = validate_url(url) {
        return Listing::failed(url, e.to_string());
    }

    let html = match source.fetch_html(url).await {
        Ok(html) => html,
        Err(e) => return Listing::failed(url, e.to_string()),
    };

    let mut listing = extract_listing(&html, url, options.max_images);

    if options.download_images {
        for image in &mut listing.images {
            match source.fetch_bytes(&image.url).await {
                Ok(bytes) => {
                    image.data = ImageData::from_bytes(bytes);
                    if image.data.is_none() {
                        tracing::warn!(url = %image.url, "unsupported image format, not embedding");
                    }
                }
                Err(e) => tracing::warn!(url = %image.url, "image download failed: {}", e),
            }
        }
    }

    listing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::media::tests::png_header;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// In-memory portal: pages and images by URL, everything else is a 404.
    #[derive(Default)]
    struct FakePortal {
        pages: HashMap<String, String>,
        images: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl PageSource for FakePortal {
        async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
            self.pages.get(url).cloned().ok_or(FetchError::Upstream(404))
        }

        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.images.get(url).cloned().ok_or(FetchError::Upstream(404))
        }
    }

    fn options() -> ScrapeOptions {
        ScrapeOptions {
            max_images: 3,
            download_images: true,
        }
    }

    fn portal() -> FakePortal {
        let mut portal = FakePortal::default();
        portal.pages.insert(
            "https://portal.example/a".into(),
            r#"<html><body><h1>T2 Apartment, Lisbon</h1>
               <strong aria-label="Preço">250.000€</strong>
               <img src="https://img.example/a1.png"><img src="https://img.example/a2.webp">
               <img src="https://img.example/missing.jpg"></body></html>"#
                .into(),
        );
        portal.pages.insert(
            "https://portal.example/b".into(),
            "<html><body><h1>Moradia T4</h1></body></html>".into(),
        );
        portal
            .images
            .insert("https://img.example/a1.png".into(), png_header(1024, 768));
        portal
            .images
            .insert("https://img.example/a2.webp".into(), b"RIFF....WEBPVP8 ".to_vec());
        portal
    }

    #[tokio::test]
    async fn test_listings_keep_input_order() {
        let urls = vec![
            "https://portal.example/a".to_string(),
            "https://portal.example/b".to_string(),
        ];
        let listings = scrape_all(&portal(), &urls, &options()).await;
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].title, "T2 Apartment, Lisbon");
        assert_eq!(listings[0].price, "250.000€");
        assert_eq!(listings[1].title, "Moradia T4");
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_the_batch() {
        let urls = vec![
            "https://portal.example/gone".to_string(),
            "not a url".to_string(),
            "https://portal.example/b".to_string(),
        ];
        let listings = scrape_all(&portal(), &urls, &options()).await;
        assert_eq!(listings.len(), 3);
        assert_eq!(
            listings[0].failure.as_deref(),
            Some("upstream returned HTTP 404")
        );
        assert_eq!(listings[0].url, "https://portal.example/gone");
        assert!(listings[1].is_failed());
        assert!(!listings[2].is_failed());
    }

    #[tokio::test]
    async fn test_image_downloads() {
        let urls = vec!["https://portal.example/a".to_string()];
        let listings = scrape_all(&portal(), &urls, &options()).await;
        let images = &listings[0].images;
        assert_eq!(images.len(), 3);
        assert_eq!(
            images[0].data.as_ref().and_then(|d| d.dimensions),
            Some((1024, 768))
        );
        // Unsupported format and failed download keep the URL without bytes.
        assert!(images[1].data.is_none());
        assert!(images[2].data.is_none());
        assert_eq!(images[2].url, "https://img.example/missing.jpg");
    }

    #[tokio::test]
    async fn test_images_can_be_skipped() {
        let urls = vec!["https://portal.example/a".to_string()];
        let opts = ScrapeOptions {
            max_images: 1,
            download_images: false,
        };
        let listings = scrape_all(&portal(), &urls, &opts).await;
        assert_eq!(listings[0].images.len(), 1);
        assert!(listings[0].images[0].data.is_none());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let listings = scrape_all(&portal(), &[], &options()).await;
        assert!(listings.is_empty());
    }
}
