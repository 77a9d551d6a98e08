//! `GET /events` (§6): the one-way push channel — subscribe to the
//! broadcast-backed event stream and forward each event as an SSE frame.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures_util::Stream;

use super::AppState;

pub async fn events(State(app): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = app.event_bus.subscribe();
    let frames = futures_util::stream::unfold(stream, |mut stream| async move {
        let event = stream.recv().await?;
        let frame = Event::default().json_data(event.to_json_value()).unwrap_or_else(|_| Event::default());
        Some((Ok::<_, Infallible>(frame), stream))
    });
    Sse::new(frames)
}
