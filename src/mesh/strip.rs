//! Triangle-strip indexing of a rectangular vertex grid.
//!
//! Rows of quads are walked in boustrophedon order: even strip rows left to
//! right, odd strip rows right to left, so consecutive strip vertices are
//! always neighbours in the grid. Before every strip row after the first, the
//! previous index is emitted once more; the resulting zero-area triangles
//! stitch the rows together without a primitive restart.

/// Number of indices the strip itself occupies on a `rows × cols` grid.
pub fn strip_len(rows: usize, cols: usize) -> usize {
    if rows < 2 {
        return 0;
    }
    (rows - 1) * 2 * cols + (rows - 2)
}

/// Number of indices in a mesh index buffer: `rows × cols × 2`.
pub fn index_buffer_len(rows: usize, cols: usize) -> usize {
    rows * cols * 2
}

/// Position in the index buffer where strip row `row` starts.
///
/// For `row > 0` this is the duplicated index that opens the row.
pub fn strip_row_start(row: usize, cols: usize) -> usize {
    if row == 0 {
        0
    } else {
        row * 2 * cols + row - 1
    }
}

/// Builds the index buffer for a `rows × cols` grid stored row-major.
///
/// The buffer holds `rows × cols × 2` indices. Anything past
/// [`strip_len`] repeats the final strip index, which only adds degenerate
/// triangles. Callers must ensure `rows >= 2` and `cols >= 2`.
pub fn triangle_strip_indices(rows: usize, cols: usize) -> Vec<u32> {
    let total = index_buffer_len(rows, cols);
    let mut indices: Vec<u32> = Vec::with_capacity(total);

    let mut vertex = 0usize;
    for row in 0..rows - 1 {
        if row > 0 {
            if let Some(&last) = indices.last() {
                indices.push(last);
            }
        }
        for col in 0..cols {
            if col > 0 {
                if row % 2 == 0 {
                    vertex += 1;
                } else {
                    vertex -= 1;
                }
            }
            indices.push(vertex as u32);
            indices.push((vertex + cols) as u32);
        }
        vertex += cols;
    }

    if let Some(&last) = indices.last() {
        indices.resize(total, last);
    }
    indices
}
