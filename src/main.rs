use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use eyre::{Result, eyre};
use std::path::PathBuf;
use taskboard::filter::{self, MonthFilter};
use taskboard::models::combine_due;
use taskboard::{Category, CategoryPatch, NewCategory, NewTask, Priority, Store, Task, TaskPatch};

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(about = "Taskboard CLI - ordered categories and tasks with local persistence")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the store directory (default: platform data directory)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List categories in order
    Categories,

    /// List tasks, grouped by category
    Tasks {
        /// Only this category
        #[arg(short, long)]
        category: Option<String>,
        /// Only tasks due in this month (YYYY-MM)
        #[arg(short, long, value_parser = parse_month)]
        month: Option<MonthFilter>,
        /// Only tasks due in the current month
        #[arg(long, conflicts_with = "month")]
        this_month: bool,
    },

    /// Add a category at the end of the list
    AddCategory {
        name: String,
        #[arg(long, default_value = "#9b87f5")]
        color: String,
        #[arg(long)]
        icon: Option<String>,
    },

    /// Add a task at the end of a category
    AddTask {
        title: String,
        #[arg(short, long)]
        category: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
        /// Due time (HH:MM), combined with --due
        #[arg(long)]
        time: Option<String>,
        #[arg(short, long, value_parser = parse_priority)]
        priority: Option<Priority>,
    },

    /// Change a category's name, colour or icon
    UpdateCategory {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        icon: Option<String>,
    },

    /// Change fields of a task
    UpdateTask {
        id: String,
        #[arg(long)]
        title: Option<String>,
        /// New description; an empty string clears it
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long, requires = "due")]
        time: Option<String>,
        /// Remove the due date
        #[arg(long, conflicts_with = "due")]
        clear_due: bool,
        /// low, medium, high or none
        #[arg(long, value_parser = parse_priority_choice)]
        priority: Option<PriorityChoice>,
        #[arg(long)]
        completed: Option<bool>,
    },

    /// Delete a category and all of its tasks
    DeleteCategory { id: String },

    /// Delete a task
    DeleteTask { id: String },

    /// Move the category at one position to another
    MoveCategory { from: usize, to: usize },

    /// Move a task by position, within or across categories
    MoveTask {
        source: String,
        destination: String,
        from: usize,
        to: usize,
    },

    /// Show the high-priority task to attend to next
    Priority,
}

fn main() -> Result<()> {
    // Setup tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let store_path = cli.store_path.unwrap_or_else(taskboard::config::default_store_path);

    // Open store
    let mut store = Store::open(&store_path)?;
    let now = Local::now().naive_local();

    match cli.command {
        Commands::Categories => print_categories(&store),
        Commands::Tasks {
            category,
            month,
            this_month,
        } => {
            let month = month.or_else(|| this_month.then(|| MonthFilter::containing(now.date())));
            print_tasks(&store, category.as_deref(), month.as_ref(), now);
        }
        Commands::AddCategory { name, color, icon } => {
            let category = store.add_category(NewCategory { name, color, icon })?;
            println!("Added category {} ({})", paint(&category.name, &category.color), category.id);
        }
        Commands::AddTask {
            title,
            category,
            description,
            due,
            time,
            priority,
        } => {
            let task = store.add_task(NewTask {
                title,
                category_id: category,
                completed: false,
                description,
                due_date: due,
                due_time: time,
                priority,
            })?;
            println!("Added task {} at position {} ({})", task.title.bold(), task.position, task.id);
        }
        Commands::UpdateCategory { id, name, color, icon } => {
            let patch = CategoryPatch { name, color, icon };
            if patch.is_empty() {
                return Err(eyre!("Nothing to update for {}: pass --name, --color or --icon", id));
            }
            let changed = store.update_category(&id, &patch)?;
            report(changed, "Updated category", &id);
        }
        Commands::UpdateTask {
            id,
            title,
            description,
            due,
            time,
            clear_due,
            priority,
            completed,
        } => {
            let due_date = if clear_due {
                Some(None)
            } else {
                due.map(|due| combine_due(Some(&due), time.as_deref()))
            };
            let patch = TaskPatch {
                title,
                completed,
                description: description.map(Some),
                due_date,
                priority: priority.map(|choice| choice.0),
            };
            if patch.is_empty() {
                return Err(eyre!("Nothing to update for {}", id));
            }
            let changed = store.update_task(&id, &patch)?;
            report(changed, "Updated task", &id);
        }
        Commands::DeleteCategory { id } => {
            let changed = store.delete_category(&id)?;
            report(changed, "Deleted category", &id);
        }
        Commands::DeleteTask { id } => {
            let changed = store.delete_task(&id)?;
            report(changed, "Deleted task", &id);
        }
        Commands::MoveCategory { from, to } => {
            if store.reorder_categories(from, to)? {
                print_categories(&store);
            } else {
                println!("{}", "Nothing to move".dimmed());
            }
        }
        Commands::MoveTask {
            source,
            destination,
            from,
            to,
        } => {
            if store.reorder_tasks(&source, &destination, from, to)? {
                print_tasks(&store, Some(source.as_str()), None, now);
                if source != destination {
                    print_tasks(&store, Some(destination.as_str()), None, now);
                }
            } else {
                println!("{}", "Nothing to move".dimmed());
            }
        }
        Commands::Priority => match store.upcoming_priority_task(now) {
            Some(task) => {
                let label = if filter::is_overdue(task, now) {
                    "OVERDUE PRIORITY".red().bold()
                } else {
                    "UPCOMING PRIORITY".yellow().bold()
                };
                println!("{} {} (due {})", label, task.title, task.due_date.as_deref().unwrap_or("-"));
            }
            None => println!("{}", "No high-priority tasks with a due date".dimmed()),
        },
    }

    Ok(())
}

fn parse_month(value: &str) -> Result<MonthFilter, String> {
    value.parse().map_err(|e| format!("{}", e))
}

fn parse_priority(value: &str) -> Result<Priority, String> {
    value.parse().map_err(|e| format!("{}", e))
}

/// A priority to set, or `none` to clear it
#[derive(Debug, Clone, Copy, PartialEq)]
struct PriorityChoice(Option<Priority>);

fn parse_priority_choice(value: &str) -> Result<PriorityChoice, String> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(PriorityChoice(None));
    }
    parse_priority(value).map(|priority| PriorityChoice(Some(priority)))
}

fn report(changed: bool, action: &str, id: &str) {
    if changed {
        println!("{} {}", action, id);
    } else {
        println!("{}", format!("No change for {}", id).dimmed());
    }
}

fn print_categories(store: &Store) {
    let categories = store.sorted_categories();
    if categories.is_empty() {
        println!("{}", "No categories yet".dimmed());
        return;
    }

    for category in categories {
        let count = store.tasks_for_category(&category.id, None).len();
        println!(
            "{:>3}  {}  [{}]  {} task(s)  {}",
            category.position,
            paint(&category.name, &category.color),
            category.icon,
            count,
            category.id.dimmed()
        );
    }
}

fn print_tasks(store: &Store, only: Option<&str>, month: Option<&MonthFilter>, now: NaiveDateTime) {
    if let Some(month) = month {
        let total = filter::filtered_task_count(store.tasks(), month);
        println!("Showing tasks for {}: {} task(s) found", month, total);
    }

    let categories: Vec<&Category> = match (only, month) {
        (Some(id), _) => store.category(id).into_iter().collect(),
        (None, Some(month)) => filter::categories_with_tasks_in(store.categories(), store.tasks(), month),
        (None, None) => store.sorted_categories(),
    };

    for category in categories {
        println!("{}", paint(&category.name, &category.color).bold());
        let tasks = store.tasks_for_category(&category.id, month);
        if tasks.is_empty() {
            println!("     {}", "(empty)".dimmed());
        }
        for task in tasks {
            println!("{}", format_task(task, now));
        }
    }
}

fn format_task(task: &Task, now: NaiveDateTime) -> String {
    let check = if task.completed { "[x]" } else { "[ ]" };
    let mut line = format!("{:>4} {} {}", task.position, check, task.title);

    if let Some(due) = &task.due_date {
        let due = format!("due {}", due);
        if filter::is_overdue(task, now) {
            line.push_str(&format!("  {}", due.red()));
        } else {
            line.push_str(&format!("  {}", due.dimmed()));
        }
    }
    if let Some(priority) = task.priority {
        let label = format!("!{}", priority);
        let label = match priority {
            Priority::High => label.red(),
            Priority::Medium => label.yellow(),
            Priority::Low => label.green(),
        };
        line.push_str(&format!("  {}", label));
    }
    line.push_str(&format!("  {}", task.id.dimmed()));
    line
}

/// Colour text with a `#rrggbb` or `#rgb` value, leaving it plain otherwise
fn paint(text: &str, hex: &str) -> ColoredString {
    match parse_hex(hex) {
        Some((r, g, b)) => text.truecolor(r, g, b),
        None => text.normal(),
    }
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.trim().strip_prefix('#')?;
    if !digits.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match digits.len() {
        6 => Some((channel(&digits[0..2])?, channel(&digits[2..4])?, channel(&digits[4..6])?)),
        3 => {
            let expand = |i: usize| channel(&digits[i..i + 1]).map(|v| v * 17);
            Some((expand(0)?, expand(1)?, expand(2)?))
        }
        _ => None,
    }
}
