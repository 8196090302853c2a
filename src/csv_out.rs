use std::io::Write;
use std::path::Path;

use crate::models::Listing;

/// Columns before the image references, in output order.
const LEADING_COLUMNS: &[&str] = &[
    "title",
    "price",
    "location",
    "area",
    "typology",
    "bedrooms",
    "bathrooms",
    "description",
];

pub fn header(image_columns: usize) -> Vec<String> {
    let mut columns: Vec<String> = LEADING_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend((1..=image_columns).map(|i| format!("image{i}")));
    columns.push("url".to_string());
    columns.push("error".to_string());
    columns
}

fn row(listing: &Listing, image_columns: usize) -> Vec<String> {
    let mut cells = vec![
        listing.title.clone(),
        listing.price.clone(),
        listing.location.clone(),
        listing.area_text(),
        listing.typology.clone(),
        listing.bedrooms_text(),
        listing.bathrooms_text(),
        listing.description.clone(),
    ];
    cells.extend((0..image_columns).map(|i| {
        listing
            .images
            .get(i)
            .map(|img| img.url.clone())
            .unwrap_or_default()
    }));
    cells.push(listing.url.clone());
    cells.push(listing.failure.clone().unwrap_or_default());
    cells
}

/// Header plus one row per listing, in input order.
pub fn write_listings<W: Write>(
    writer: W,
    listings: &[Listing],
    image_columns: usize,
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(header(image_columns))?;
    for listing in listings {
        wtr.write_record(row(listing, image_columns))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv(path: &Path, listings: &[Listing], image_columns: usize) -> Result<(), csv::Error> {
    let file = std::fs::File::create(path)?;
    write_listings(file, listings, image_columns)?;
    tracing::info!("wrote {} rows to {}", listings.len(), path.display());
    Ok(())
}
