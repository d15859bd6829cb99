use blog_client::ApiError;
use blog_core::{Blog, Paginated, SavedBlog, User};
use colored::Colorize;

pub fn user(user: &User) {
    println!("{} {}", "👤".cyan(), user.username.bold());
    println!("   email:  {}", user.email);
    let name = user.full_name();
    if !name.is_empty() {
        println!("   name:   {}", name);
    }
    println!("   joined: {}", user.date_joined.format("%Y-%m-%d"));
}

pub fn page(page: u32, blogs: &Paginated<Blog>) {
    if blogs.results.is_empty() {
        println!("{}", "No posts found.".yellow());
        return;
    }

    for blog in &blogs.results {
        let draft = match blog.is_published {
            Some(false) => " [draft]".yellow().to_string(),
            _ => String::new(),
        };
        println!(
            "{} {}{}",
            format!("#{}", blog.id).dimmed(),
            blog.title.bold(),
            draft
        );
        println!(
            "   by {} on {}",
            blog.author.username,
            blog.created_at.format("%Y-%m-%d")
        );
        println!("   {}", blog.body());
    }

    println!();
    println!(
        "{}",
        format!(
            "Page {} of {} ({} posts)",
            page,
            blogs.total_pages(),
            blogs.count
        )
        .dimmed()
    );
}

pub fn blog(blog: &Blog, owned: bool) {
    println!("{}", blog.title.bold());
    println!(
        "{}",
        format!(
            "by {} · created {} · updated {}",
            blog.author.username,
            blog.created_at.format("%Y-%m-%d %H:%M"),
            blog.updated_at.format("%Y-%m-%d %H:%M")
        )
        .dimmed()
    );
    println!();
    println!("{}", blog.body());
    if owned {
        println!();
        println!(
            "{}",
            format!(
                "You wrote this. Edit: blog-cli edit {id} · Delete: blog-cli delete {id}",
                id = blog.id
            )
            .cyan()
        );
    }
}

pub fn saved(saved: &SavedBlog) {
    let state = if saved.is_published { "published" } else { "draft" };
    println!(
        "{}",
        format!("✅ Saved #{} \"{}\" ({})", saved.id, saved.title, state).green()
    );
}

pub fn api_error(err: &ApiError) {
    eprintln!("{} {}", "❌".red(), err.user_message().red());
    if let Some(fields) = err.field_errors() {
        for (field, messages) in fields.field_messages() {
            for message in messages {
                eprintln!("   {}: {}", field.bold(), message);
            }
        }
    }
    if err.requires_login() {
        eprintln!("{}", "Run `blog-cli login` to sign in.".yellow());
    }
}
