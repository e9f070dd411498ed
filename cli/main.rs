use clap::{Parser, Subcommand};
use kiru::{
    app::{AppError, ManualCropCommand, fetch_image},
    crop::CropBox,
    storage::{ImageId, Storage},
};
use std::{path::PathBuf, str::FromStr};

#[derive(Parser)]
#[command(name = "kiru")]
#[command(about = "Product image crop CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    Crop {
        #[arg(help = "Path to image file")]
        path: PathBuf,

        #[arg(short, long, help = "Crop region as x,y,width,height")]
        region: String,

        #[arg(short, long, help = "Product metadata as JSON")]
        product: Option<String>,
    },
    Fetch {
        #[arg(help = "Identifier returned by a crop")]
        id: String,

        #[arg(short, long, help = "Path to write the stored image to")]
        out: PathBuf,
    },
}

fn parse_region(input: &str) -> Option<CropBox> {
    let parts = input
        .split(',')
        .map(|p| p.trim().parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;

    match parts.as_slice() {
        [x, y, width, height] => CropBox::new(*x, *y, *width, *height).ok(),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let storage_root =
        std::env::var("KIRU_STORAGE_DIR").unwrap_or_else(|_| "./processed_images".to_string());
    let storage = Storage::new(PathBuf::from(storage_root));

    let cli = Cli::parse();

    match cli.command {
        Commands::Crop {
            path,
            region,
            product,
        } => {
            let bytes = tokio::fs::read(&path)
                .await
                .expect("failed to read image bytes");
            let region = parse_region(&region).expect("region must be x,y,width,height");
            let product = product
                .map(|p| serde_json::from_str(&p).expect("product must be valid JSON"))
                .unwrap_or(serde_json::Value::Null);

            let id = ManualCropCommand::new(&bytes, region)
                .with_product(product)
                .execute(&storage)?;

            println!("✅ Stored cropped image:");
            println!("{id}");
        }
        Commands::Fetch { id, out } => {
            let id = ImageId::from_str(&id).expect("id must be a valid UUID");

            let bytes = fetch_image(&storage, &id)?;
            tokio::fs::write(&out, bytes)
                .await
                .expect("failed to write image bytes");

            println!("✅ Wrote {} to {}", id, out.display());
        }
    }

    Ok(())
}
