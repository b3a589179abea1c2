mod graph;
mod line_problem;
mod parallel;
mod workset;
