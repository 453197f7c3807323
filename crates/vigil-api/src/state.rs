use std::sync::Arc;

use vigil_db::EntityStore;
use vigil_gateway::EventSink;

use crate::comments::CommentAggregateUpdater;
use crate::positions::PositionReconciler;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub positions: PositionReconciler,
    pub comments: CommentAggregateUpdater,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(store: Arc<dyn EntityStore>, events: Arc<dyn EventSink>, jwt_secret: String) -> AppState {
        Arc::new(Self {
            positions: PositionReconciler::new(store.clone(), events.clone()),
            comments: CommentAggregateUpdater::new(store, events),
            jwt_secret,
        })
    }
}
