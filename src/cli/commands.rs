//! Command execution against a ready client

use super::args::{Commands, read_upload};
use crate::api::{Book, BookPage, NewBook};
use crate::client::LibraryClient;
use crate::error::SyncError;
use crate::mutation::{Mutation, MutationOutput};
use anyhow::{Context, Result, anyhow};

/// Turn a client failure into the message shown to the user
fn report(default: &'static str) -> impl FnOnce(SyncError) -> anyhow::Error {
    move |error| match &error {
        SyncError::Api(api) if api.is_transient() => {
            anyhow!("{} (is the library service reachable?)", error.user_message(default))
        }
        _ => anyhow!(error.user_message(default)),
    }
}

pub async fn execute(client: &LibraryClient, command: Commands) -> Result<()> {
    match command {
        Commands::Signup { .. } => {
            let request = command
                .signup_request()
                .context("Signup command without signup arguments")?;
            let user = client
                .signup(&request)
                .await
                .map_err(report("Signup failed."))?;
            println!("Registered {} ({}). Sign in with `shelf login`.", user.username, user.email);
        }
        Commands::Login { email, password } => {
            let user = client
                .login(&email, &password)
                .await
                .map_err(report("Invalid credentials"))?;
            println!("Signed in as {}", user.username);
        }
        Commands::Logout => {
            client.logout().await;
            println!("Signed out");
        }
        Commands::Whoami => match client.current_user() {
            Some(user) => {
                println!("{} <{}> (id {})", user.username, user.email, user.id);
                if let Some(full_name) = user.full_name {
                    println!("  name: {}", full_name);
                }
                if let Some(bio) = user.bio {
                    println!("  bio:  {}", bio);
                }
            }
            None => println!("Not signed in"),
        },
        Commands::Profile { .. } => {
            let update = command
                .profile_update()
                .context("Profile command without profile arguments")?;
            let user = client
                .update_profile(&update)
                .await
                .map_err(report("Could not update profile."))?;
            println!("Updated profile of {}", user.username);
        }
        Commands::Books { page, genre } => {
            let books = client
                .fetch_books(page, genre)
                .await
                .map_err(report("Could not load books."))?;
            print_page(&books);
        }
        Commands::Borrowed => {
            let borrows = client
                .fetch_borrowed()
                .await
                .map_err(report("Could not load borrowed books."))?;
            if borrows.is_empty() {
                println!("You hold no books");
            }
            for borrow in borrows.iter().filter(|borrow| borrow.is_active()) {
                println!(
                    "book {} borrowed {}",
                    borrow.book_id,
                    borrow.borrowed_at.format("%Y-%m-%d")
                );
            }
        }
        Commands::Borrow { book_id } => {
            client
                .borrow(book_id)
                .await
                .map_err(report("Could not borrow book."))?;
            println!("Borrowed book {}", book_id);
        }
        Commands::Return { book_id } => {
            client
                .return_book(book_id)
                .await
                .map_err(report("Could not return book."))?;
            println!("Returned book {}", book_id);
        }
        Commands::Review {
            book_id,
            rating,
            body,
        } => {
            client
                .review(book_id, rating, &body)
                .await
                .map_err(report("Could not submit review."))?;
            println!("Review submitted for book {}", book_id);
        }
        Commands::Analysis { book_id } => {
            let analysis = client
                .fetch_analysis(book_id)
                .await
                .map_err(report("Could not load analysis."))?;
            println!(
                "Average rating {:.1} from {} review(s)",
                analysis.average_rating, analysis.review_count
            );
            if let Some(summary) = analysis.ai_summary {
                println!("\nSummary:\n{}", summary);
            }
            if let Some(consensus) = analysis.ai_review_consensus {
                println!("\nReader consensus:\n{}", consensus);
            }
        }
        Commands::Recommend => {
            let recommendations = client
                .fetch_recommendations()
                .await
                .map_err(report("Could not load recommendations."))?;
            println!("Recommended ({}):", recommendations.strategy);
            for book in &recommendations.books {
                print_book(book);
            }
        }
        Commands::Upload {
            file,
            title,
            author,
            genre,
            description,
            year,
        } => {
            let upload = read_upload(&file)
                .await
                .with_context(|| format!("Failed to read {:?}", file))?;
            let book = NewBook {
                title,
                author,
                isbn: None,
                description,
                genre,
                published_year: year,
                file: upload,
            };
            let output = client
                .mutate(Mutation::CreateBook(book))
                .await
                .map_err(report("Could not upload book."))?;
            if let MutationOutput::Created(book) = output {
                println!("Uploaded book {}: {}", book.id, book.title);
            }
        }
        Commands::Edit { book_id, .. } => {
            let update = command
                .book_update()
                .context("Edit command without edit arguments")?;
            client
                .mutate(Mutation::UpdateBook { book_id, update })
                .await
                .map_err(report("Could not update book."))?;
            println!("Updated book {}", book_id);
        }
        Commands::Delete { book_id } => {
            client
                .mutate(Mutation::DeleteBook(book_id))
                .await
                .map_err(report("Could not delete book."))?;
            println!("Deleted book {}", book_id);
        }
        Commands::ShowConfig => {
            crate::config::ConfigDiscovery::show_discovery_info();
        }
    }

    Ok(())
}

fn print_page(page: &BookPage) {
    println!("Page {} ({} books total)", page.page, page.total);
    for book in &page.items {
        print_book(book);
    }
}

fn print_book(book: &Book) {
    let genre = book.genre.as_deref().unwrap_or("-");
    println!(
        "{:>5}  {:<40}  {:<24}  {:<12}  {}",
        book.id, book.title, book.author, genre, book.status
    );
}
