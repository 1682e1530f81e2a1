use clap::{Args, ValueEnum};
use dayflow_core::{
    render_schedule, CalendarGateway, Clock, Config, EventQuery, GoogleCalendar,
    HttpUserDirectory, SessionId, SystemClock, UserDirectory,
};

#[derive(Clone, Copy, ValueEnum)]
pub enum Day {
    Today,
    Tomorrow,
}

#[derive(Args)]
pub struct ScheduleArgs {
    /// Which working day to show
    #[arg(value_enum, default_value = "today")]
    day: Day,
    /// Chat id whose linked calendar is read
    #[arg(long)]
    user: String,
    /// Print raw events as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: ScheduleArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?.with_env_overrides();
    let window = config.day_window()?;
    let directory = HttpUserDirectory::new(&config.directory);
    let calendar = GoogleCalendar::new(&config.calendar).with_timezone(window.tz);

    let user = SessionId::new(args.user);
    let record = directory
        .user(&user)
        .await?
        .ok_or_else(|| format!("unknown user: {user}"))?;

    let now = SystemClock.now();
    let range = match args.day {
        Day::Today => window.today(now),
        Day::Tomorrow => window.tomorrow(now),
    };
    let query = EventQuery::range(range, config.calendar.event_limit as usize);
    let events = calendar.events(record.refresh_token(), &query).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&events)?);
    } else {
        println!("{}", render_schedule(&events, &window));
    }
    Ok(())
}
