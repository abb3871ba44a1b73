pub mod client;
pub mod leaderboard;
