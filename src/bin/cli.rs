use clap::{Parser, Subcommand};
use reqwest::{multipart, Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::PathBuf;

const TOKEN_FILE: &str = ".stayvista_token";

#[derive(Parser)]
#[command(name = "stayvista-cli")]
#[command(about = "CLI for the StayVista API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, env = "STAYVISTA_URL", default_value = "http://localhost:3001")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    SignUp {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    SignIn {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    SignOut,
    /// List every villa
    Villas,
    Villa {
        #[arg(short, long)]
        id: String,
    },
    BestRated {
        #[arg(short, long)]
        category: Option<String>,
    },
    Trending {
        #[arg(short, long)]
        location: Option<String>,
    },
    /// `--kind "Bank offers"` or `--kind "StayVista offers"`; omit for all
    Offers {
        #[arg(short, long)]
        kind: Option<String>,
    },
    Collections,
    AddOffer {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        code: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// bank_offer or stayvista_offer
        #[arg(short = 'k', long, default_value = "stayvista_offer")]
        kind: String,
    },
    DeleteVilla {
        #[arg(short, long)]
        id: String,
    },
    Book {
        #[arg(short, long)]
        villa_id: String,
        #[arg(short, long)]
        guest_name: Option<String>,
        #[arg(short = 'n', long)]
        guests: Option<u32>,
    },
    /// Upload one image and print its public URL
    Upload {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long, default_value = "uploads")]
        prefix: String,
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[derive(Deserialize)]
struct SessionResponse {
    token: String,
    email: String,
    role: String,
}

fn with_token(request: RequestBuilder) -> RequestBuilder {
    let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
    request.header("Authorization", format!("Bearer {}", token.trim()))
}

async fn print_response(request: RequestBuilder) -> Result<(), reqwest::Error> {
    let res = request.send().await?;
    let status = res.status();
    let body = res.text().await?;
    if status.is_success() {
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or(body)),
            Err(_) if body.is_empty() => println!("{}", status),
            Err(_) => println!("{}", body),
        }
    } else {
        eprintln!("Request failed ({}): {}", status, body);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::SignUp { email, password } => {
            let req = client
                .post(format!("{}/auth/sign-up", base))
                .json(&json!({ "email": email, "password": password }));
            print_response(req).await?;
        }
        Commands::SignIn { email, password } => {
            let res = client
                .post(format!("{}/auth/sign-in", base))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: SessionResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.token)?;
                println!("Signed in as {} ({}). Token saved to {}", body.email, body.role, TOKEN_FILE);
            } else {
                eprintln!("Sign-in failed: {}", res.text().await?);
            }
        }
        Commands::SignOut => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Signed out (token removed).");
        }
        Commands::Villas => {
            print_response(client.get(format!("{}/villas", base))).await?;
        }
        Commands::Villa { id } => {
            print_response(client.get(format!("{}/villas/{}", base, id))).await?;
        }
        Commands::BestRated { category } => {
            let mut req = client.get(format!("{}/villas/best-rated", base));
            if let Some(category) = category {
                req = req.query(&[("category", category)]);
            }
            print_response(req).await?;
        }
        Commands::Trending { location } => {
            let mut req = client.get(format!("{}/villas/trending", base));
            if let Some(location) = location {
                req = req.query(&[("location", location)]);
            }
            print_response(req).await?;
        }
        Commands::Offers { kind } => {
            let mut req = client.get(format!("{}/offers", base));
            if let Some(kind) = kind {
                req = req.query(&[("type", kind)]);
            }
            print_response(req).await?;
        }
        Commands::Collections => {
            print_response(client.get(format!("{}/collections", base))).await?;
        }
        Commands::AddOffer {
            title,
            code,
            description,
            kind,
        } => {
            let req = with_token(client.post(format!("{}/admin/offers", base))).json(&json!({
                "title": title,
                "code": code,
                "description": description,
                "type": kind,
            }));
            print_response(req).await?;
        }
        Commands::DeleteVilla { id } => {
            let req = with_token(client.delete(format!("{}/admin/villas/{}", base, id)));
            print_response(req).await?;
        }
        Commands::Book {
            villa_id,
            guest_name,
            guests,
        } => {
            let req = client.post(format!("{}/bookings", base)).json(&json!({
                "villaId": villa_id,
                "guestName": guest_name,
                "guests": guests,
            }));
            print_response(req).await?;
        }
        Commands::Upload { file, prefix, name } => {
            let bytes = tokio::fs::read(&file).await?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let mut form = multipart::Form::new()
                .text("prefix", prefix)
                .part("file", multipart::Part::bytes(bytes).file_name(file_name));
            if let Some(name) = name {
                form = form.text("name", name);
            }
            let req = with_token(client.post(format!("{}/admin/uploads", base))).multipart(form);
            print_response(req).await?;
        }
    }

    Ok(())
}
