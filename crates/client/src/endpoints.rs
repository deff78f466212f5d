//! REST endpoint paths, relative to the platform base URL.

pub const LIST_DATA: &str = "data/list";
pub const DATA_UPLOAD: &str = "data/upload";
pub const DATA_DOWNLOAD: &str = "data/download";

pub const GET_VARIABLE: &str = "variables/get";
pub const LIST_VARIABLES: &str = "variables/list";
pub const SET_VARIABLE: &str = "variables/set";
pub const DELETE_VARIABLE: &str = "variables/delete";

pub const GET_PREDICTIONS: &str = "predictions/get";
pub const LIST_PREDICTIONS_MODELS: &str = "predictions/list-models";
