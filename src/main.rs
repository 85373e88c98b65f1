use std::{path::Path, time::Duration};

use quizcast::{
    Config, Orchestrator, Report, StartRequest,
    answers::Outcome,
    bus::LocalBus,
    message::{FeedbackMessage, FinalResultMessage, LeaderboardMessage, QuestionMessage, ScoreMessage},
    player::Id,
    question::QuestionPool,
    runtime::{self, PlayerCommand, PlayerSetup, Screen},
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const BOTS: [&str; 4] = ["Ada", "Grace", "Linus", "Margaret"];
const QUESTION_COUNT: usize = 3;
const TIME_LIMIT_SECONDS: u64 = 5;

/// A simulated player that picks a random option after a random delay
struct BotScreen {
    nickname: &'static str,
    commands: mpsc::UnboundedSender<PlayerCommand>,
    rng: fastrand::Rng,
}

impl Screen for BotScreen {
    fn show_question(&mut self, question: &QuestionMessage) {
        tracing::info!(bot = self.nickname, round = question.id, "{}", question.question);

        let option = self.rng.usize(..question.options.len());
        // occasionally too slow, so the countdown answers for us
        let delay = Duration::from_secs(self.rng.u64(1..=question.timer + 2));
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(PlayerCommand::Select(option));
        });
    }

    fn show_expired(&mut self) {
        tracing::info!(bot = self.nickname, "ran out of time");
    }

    fn show_feedback(&mut self, feedback: &FeedbackMessage) {
        tracing::info!(bot = self.nickname, correct = feedback.correct, "feedback");
    }

    fn show_leaderboard(&mut self, leaderboard: &LeaderboardMessage) {
        tracing::debug!(bot = self.nickname, entries = leaderboard.0.len(), "leaderboard");
    }

    fn show_final_result(&mut self, result: &FinalResultMessage) {
        tracing::debug!(bot = self.nickname, players = result.classement.len(), "final result");
    }

    fn show_score(&mut self, score: &ScoreMessage) {
        tracing::info!(
            bot = self.nickname,
            score = score.score,
            total = score.total,
            rank = score.rank,
            "finished"
        );
    }
}

fn load_pool(path: Option<String>) -> QuestionPool {
    let Some(path) = path else {
        return QuestionPool::builtin();
    };

    match std::fs::read_to_string(&path).map(|text| QuestionPool::from_json(&text)) {
        Ok(Ok(pool)) => {
            tracing::info!(%path, questions = pool.len(), "loaded question pool");
            pool
        }
        Ok(Err(e)) => {
            tracing::error!(%path, error = %e, "invalid question file");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(%path, error = %e, "cannot read question file");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "quizcast.toml".to_string());
    let config = Config::load(Path::new(&config_path));
    let pool = load_pool(args.next());

    let bus = LocalBus::new(config.bus_capacity);
    let prefix = config.topic_prefix.clone();

    let subscription = bus.subscribe(runtime::orchestrator_topics(&prefix));
    let mut session =
        runtime::spawn_orchestrator(Orchestrator::new(config, pool), bus.clone(), subscription);

    let players = BOTS
        .into_iter()
        .map(|nickname| {
            let id = Id::new();
            let (commands, inbox) = mpsc::unbounded_channel();
            let subscription = bus.subscribe(runtime::player_topics(&prefix, &id));
            runtime::spawn_player(
                PlayerSetup {
                    prefix: prefix.clone(),
                    id,
                    nickname: nickname.to_string(),
                },
                bus.clone(),
                subscription,
                inbox,
                BotScreen {
                    nickname,
                    commands,
                    rng: fastrand::Rng::new(),
                },
            )
        })
        .collect::<Vec<_>>();

    let mut joined = 0;
    while joined < BOTS.len() {
        match session.next_report().await {
            Some(Report::PlayerJoined { nickname, .. }) => {
                joined += 1;
                tracing::info!(%nickname, joined, "player joined");
            }
            Some(_) => {}
            None => return,
        }
    }

    if let Err(e) = session
        .start(StartRequest::new(QUESTION_COUNT, TIME_LIMIT_SECONDS))
        .await
    {
        tracing::error!(error = %e, "session did not start");
        return;
    }

    while let Some(report) = session.next_report().await {
        match report {
            Report::RoundOpened { index, count } => {
                tracing::info!(round = index + 1, of = count, "round opened");
            }
            Report::RoundClosed { index, stats } => tracing::info!(
                round = index + 1,
                correct = stats[Outcome::Correct],
                incorrect = stats[Outcome::Incorrect],
                timed_out = stats[Outcome::TimedOut],
                "round closed"
            ),
            Report::Finished(standings) => {
                for standing in standings {
                    tracing::info!(
                        rank = standing.rank,
                        nickname = %standing.nickname,
                        score = standing.score,
                        "final standing"
                    );
                }
            }
            Report::TransportFailure(e) => tracing::error!(error = %e, "transport failure"),
            other => tracing::debug!(report = ?other, "report"),
        }
    }

    for player in players {
        if let Err(e) = player.await {
            tracing::error!(error = %e, "player task failed");
        }
    }
    session.stop().await;
}
