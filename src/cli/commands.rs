//! Command implementations for the postboard CLI.

use crate::{
    board::{pagination::PaginatedResult, post::Post, repository::PostRepository},
    cli::utils::{format_post_line, format_timestamp, parse_cursor, parse_post_id},
    Result,
};
use tracing::info;

fn print_page(page: &PaginatedResult<Post>) {
    if page.items.is_empty() {
        println!("(no posts on this page)");
    }
    for post in &page.items {
        println!("{}", format_post_line(post));
    }
    if let Some(prev) = &page.prev_cursor {
        println!("prev: {}", prev.encode());
    }
    if let Some(next) = &page.next_cursor {
        println!("next: {}", next.encode());
    }
}

/// Execute post command
pub fn post(
    repo: &PostRepository,
    author: &str,
    category: &str,
    title: &str,
    content: &str,
) -> Result<()> {
    let post = repo.create_root_post(Post::new(author, category, title, content))?;
    println!("{}", post.id);
    Ok(())
}

/// Execute reply command
pub fn reply(repo: &PostRepository, parent: &str, author: &str, content: &str) -> Result<()> {
    let parent = parse_post_id(parent)?;
    let reply = repo.create_reply(&parent, Post::reply(author, content))?;
    println!("{}", reply.id);
    Ok(())
}

/// Execute show command
pub fn show(repo: &PostRepository, id: &str) -> Result<()> {
    let post = repo.get_post(&parse_post_id(id)?)?;

    println!("id:          {}", post.id);
    println!("position:    {}", post.id.short());
    println!("index:       {}", post.index);
    println!("author:      {}", post.author);
    if !post.is_reply() {
        println!("category:    {}", post.category);
    }
    println!("title:       {}", post.title);
    println!("replies:     {}", post.replies);
    println!("created:     {}", format_timestamp(post.create_time));
    println!("last reply:  {}", format_timestamp(post.reply_time));
    println!(
        "flags:       locked={} highlighted={} saged={} banned={}",
        post.locked, post.highlighted, post.saged, post.banned
    );
    if let Some(parent) = post.parent() {
        println!("parent:      {}", parent);
    }
    println!();
    println!("{}", post.content);
    Ok(())
}

/// Execute list command
pub fn list(repo: &PostRepository, tag: &str, cursor: Option<&str>, limit: usize) -> Result<()> {
    let cursor = parse_cursor(cursor)?;
    let page = repo.find_posts(tag, cursor.as_ref(), limit)?;
    print_page(&page);
    Ok(())
}

/// Execute replies command
pub fn replies(repo: &PostRepository, id: &str, cursor: Option<&str>, limit: usize) -> Result<()> {
    let parent = parse_post_id(id)?;
    let cursor = parse_cursor(cursor)?;
    let page = repo.find_replies(&parent, cursor.as_ref(), limit)?;
    print_page(&page);
    Ok(())
}

/// Execute recategorize command
pub fn recategorize(repo: &PostRepository, id: &str, category: &str) -> Result<()> {
    let mut post = repo.get_post(&parse_post_id(id)?)?;
    let old_category = std::mem::replace(&mut post.category, category.to_string());
    let updated = repo.update_post(&post, &old_category)?;
    info!(id = %updated.id.short(), from = %old_category, to = %updated.category, "Recategorized post");
    println!("{}", format_post_line(&updated));
    Ok(())
}

/// Execute delete command
pub fn delete(repo: &PostRepository, id: &str) -> Result<()> {
    let post = repo.get_post(&parse_post_id(id)?)?;
    repo.delete_post(&post)?;
    println!("deleted {}", post.id.short());
    Ok(())
}

/// Execute lock/unlock command
pub fn lock(repo: &PostRepository, id: &str, locked: bool) -> Result<()> {
    let post = repo.set_locked(&parse_post_id(id)?, locked)?;
    println!("{}", format_post_line(&post));
    Ok(())
}

/// Execute ban/unban command
pub fn ban(repo: &PostRepository, author: &str, banned: bool) -> Result<()> {
    if banned {
        repo.ban_author(author)?;
    } else {
        repo.unban_author(author)?;
    }
    println!("{}: banned={}", author, repo.is_banned(author)?);
    Ok(())
}

/// Execute check command
///
/// Returns an error when the indexes are inconsistent so the process exits non-zero.
pub fn check(repo: &PostRepository) -> Result<()> {
    let report = repo.check_indexes()?;
    println!(
        "posts: {}  index entries: {}  root posts created: {}",
        report.posts,
        report.entries,
        repo.root_post_count()?
    );
    for entry in &report.dangling {
        println!("dangling: {}", entry);
    }
    for entry in &report.missing {
        println!("missing:  {}", entry);
    }
    if report.is_consistent() {
        println!("indexes are consistent");
        Ok(())
    } else {
        Err(crate::error::BoardError::invalid_input(format!(
            "{} dangling and {} missing index entries (run rebuild-index)",
            report.dangling.len(),
            report.missing.len()
        )))
    }
}

/// Execute rebuild-index command
pub fn rebuild_index(repo: &PostRepository) -> Result<()> {
    let written = repo.rebuild_indexes()?;
    println!("rebuilt {} index entries", written);
    Ok(())
}
