mod batched_data;
mod checkpoints;
mod screen_events;
mod tokens;
