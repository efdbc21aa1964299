use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use makeup_core::{
    FreedLesson, SlotQuery, WaitlistFilter, WaitlistStatus, WaitlistStore, find_matches,
    generate_slots_from, sweep_expired,
};

mod fixtures;

use fixtures::{load_fixture, write_fixture};

#[derive(Parser, Debug)]
#[command(name = "makeup", version, about = "Make-up lesson waitlist CLI")]
struct Cli {
    /// Org fixture file (timezone, calendar facts, waitlist entries)
    #[arg(long, default_value = "org.json")]
    fixtures: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bookable start times for a teacher on a given day
    Slots {
        #[arg(long)]
        teacher: String,

        /// Target local date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,

        /// Required lesson duration in minutes
        #[arg(long, default_value_t = 30)]
        duration: i32,

        /// Override "now" as org-local "YYYY-MM-DD HH:MM" (defaults to wall clock)
        #[arg(long)]
        now: Option<String>,
    },

    /// Rank waiting entries against a freed lesson from the fixture calendar
    Matches {
        /// Lesson id of the freed booking
        #[arg(long)]
        lesson: String,
    },

    /// List waitlist entries
    List {
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        teacher: Option<String>,

        #[arg(long)]
        student: Option<String>,
    },

    /// Entry counts per status (dashboard aggregate)
    Counts,

    /// Expire open entries whose deadline passed
    Sweep {
        /// Override "now" as org-local "YYYY-MM-DD HH:MM"
        #[arg(long)]
        now: Option<String>,

        /// Persist swept statuses back into the fixture file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let fixture = load_fixture(&cli.fixtures)?;
    let tz = fixture.tz()?;

    match cli.command {
        Command::Slots {
            teacher,
            date,
            duration,
            now,
        } => {
            let query = SlotQuery {
                teacher_id: teacher,
                date,
                duration_minutes: duration,
                preferred_time: None,
                now: resolve_now(now.as_deref(), tz)?,
                timezone: tz,
            };
            let slots = generate_slots_from(&fixture.calendar, &query);
            if slots.is_empty() {
                println!("No open slots for {} on {}", query.teacher_id, date);
                return Ok(());
            }
            println!("{} open slots for {} on {}:", slots.len(), query.teacher_id, date);
            for s in &slots {
                println!(
                    "  {} - {}",
                    s.start.with_timezone(&tz).format("%H:%M"),
                    s.end.with_timezone(&tz).format("%H:%M"),
                );
            }
        }

        Command::Matches { lesson } => {
            let Some(booked) = fixture
                .calendar
                .bookings
                .iter()
                .find(|b| b.lesson_id == lesson)
            else {
                bail!("lesson {lesson} not found in fixture calendar");
            };
            let freed = FreedLesson {
                lesson_id: booked.lesson_id.clone(),
                teacher_id: booked.teacher_id.clone(),
                start: booked.start,
                duration_minutes: (booked.end - booked.start).num_minutes() as i32,
            };

            let store = fixture.store();
            let pool = store.query(&WaitlistFilter {
                org_id: Some(fixture.org_id.clone()),
                status: Some(WaitlistStatus::Waiting),
                ..Default::default()
            });
            let matches = find_matches(&freed, &pool, tz);

            println!(
                "{} candidates for {} ({} at {})",
                matches.len(),
                freed.lesson_id,
                freed.teacher_id,
                freed.start.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
            );
            for m in &matches {
                println!(
                    "  [{:?}] {} | missed {} on {} | waiting since {}",
                    m.quality,
                    m.student_name,
                    m.missed_lesson_title,
                    m.missed_lesson_date,
                    m.waiting_since.with_timezone(&tz).format("%Y-%m-%d"),
                );
            }
        }

        Command::List {
            status,
            teacher,
            student,
        } => {
            let filter = WaitlistFilter {
                org_id: Some(fixture.org_id.clone()),
                status: status.as_deref().map(parse_status).transpose()?,
                teacher_id: teacher,
                student_id: student,
            };
            let store = fixture.store();
            for e in store.query(&filter) {
                println!(
                    "{} | {} | {} | missed {} on {}",
                    e.id, e.status, e.student_name, e.missed_lesson_title, e.missed_lesson_date,
                );
            }
        }

        Command::Counts => {
            let store = fixture.store();
            for (status, n) in store.status_counts(&fixture.org_id) {
                println!("{status:>10}: {n}");
            }
        }

        Command::Sweep { now, write } => {
            let store = fixture.store();
            let swept = sweep_expired(&store, &fixture.org_id, resolve_now(now.as_deref(), tz)?);
            println!("Expired {} entries", swept.len());
            for e in &swept {
                println!("  {} | {}", e.id, e.student_name);
            }

            if write {
                let mut updated = fixture.clone();
                updated.entries = store.query(&WaitlistFilter::default());
                write_fixture(&cli.fixtures, &updated)?;
                println!("Wrote {}", cli.fixtures.display());
            }
        }
    }

    Ok(())
}

/// Resolve an optional org-local "YYYY-MM-DD HH:MM" override to UTC.
fn resolve_now(local: Option<&str>, tz: Tz) -> Result<DateTime<Utc>> {
    let Some(local) = local else {
        return Ok(Utc::now());
    };
    let ndt = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M")
        .with_context(|| format!("invalid local datetime '{local}'"))?;
    let dt = tz
        .from_local_datetime(&ndt)
        .single()
        .with_context(|| format!("ambiguous or invalid local time (DST?): {local} {tz}"))?;
    Ok(dt.with_timezone(&Utc))
}

fn parse_status(s: &str) -> Result<WaitlistStatus> {
    let status = match s {
        "waiting" => WaitlistStatus::Waiting,
        "matched" => WaitlistStatus::Matched,
        "offered" => WaitlistStatus::Offered,
        "accepted" => WaitlistStatus::Accepted,
        "booked" => WaitlistStatus::Booked,
        "expired" => WaitlistStatus::Expired,
        "cancelled" => WaitlistStatus::Cancelled,
        other => bail!("unknown status: {other}"),
    };
    Ok(status)
}
