use warp::{Filter, Rejection, Reply};

mod dishes;
mod sessions;
pub mod state;

pub use state::{AppState, SharedState};

use crate::error::ApiError;
use crate::models::SessionId;

pub fn routes(state: SharedState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    session_routes(state.clone()).or(dish_routes(state))
}

fn session_routes(
    state: SharedState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let base = warp::path("api")
        .and(warp::path("v1"))
        .and(warp::path("sessions"));
    let session = base.and(warp::path::param::<SessionId>());

    let create_session_route = base
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(sessions::handle_create);

    let get_session_route = session
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(sessions::handle_get);

    let delete_session_route = session
        .and(warp::path::end())
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and_then(sessions::handle_delete);

    let tabs_route = session
        .and(warp::path("tabs"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(sessions::handle_tabs);

    let message_route = session
        .and(warp::path("messages"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(16 * 1024))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(sessions::handle_message);

    let reset_route = session
        .and(warp::path("reset"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state))
        .and_then(sessions::handle_reset);

    create_session_route
        .or(get_session_route)
        .or(delete_session_route)
        .or(tabs_route)
        .or(message_route)
        .or(reset_route)
}

fn dish_routes(state: SharedState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let api = warp::path("api").and(warp::path("v1"));
    // Raw segment; the handlers percent-decode it.
    let dish = api.and(warp::path("dishes")).and(warp::path::param::<String>());

    let dishes_route = api
        .and(warp::path("dishes"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(dishes::handle_list);

    let get_dish_route = dish
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(dishes::handle_get);

    let put_dish_route = dish
        .and(warp::path::end())
        .and(warp::put())
        .and(warp::body::content_length_limit(64 * 1024))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(dishes::handle_put);

    let index_route = api
        .and(warp::path("index"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state))
        .and_then(dishes::handle_index);

    dishes_route
        .or(get_dish_route)
        .or(put_dish_route)
        .or(index_route)
}

fn with_state(
    state: SharedState,
) -> impl Filter<Extract = (SharedState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Counts upstream failures before handing the error to the rejection handler.
fn reject(state: &AppState, err: ApiError) -> Rejection {
    state.metrics.record_failure(&err);
    warp::reject::custom(err)
}
