use lattice_bins::{
    combine_bins, combine_bins_by_binning, concat_bins, concat_bins_data_array, LatticeBinsError,
};
use lattice_core::{DataArray, LatticeCoreError, Variable};
use proptest::prelude::*;
use rstest::rstest;

fn events(values: Vec<f64>) -> Result<DataArray, LatticeCoreError> {
    let len = values.len();
    let ids = (0..len as i64).collect::<Vec<_>>();
    DataArray::new(Variable::from_f64(&["event"], &[len], values)?)
        .with_coord("id", Variable::from_i64(&["event"], &[len], ids)?)
}

fn binned(dims: &[&str], shape: &[usize], begin: Vec<i64>, end: Vec<i64>, n_events: usize) -> Result<Variable, LatticeCoreError> {
    let values = (0..n_events).map(|i| i as f64).collect();
    Variable::binned(
        Variable::from_i64(dims, shape, begin)?,
        Variable::from_i64(dims, shape, end)?,
        "event",
        events(values)?,
    )
}

fn ranges(var: &Variable) -> Result<(Vec<i64>, Vec<i64>), LatticeCoreError> {
    let bins = var.bins().ok_or_else(|| LatticeCoreError::internal("not binned"))?;
    Ok((bins.begin().values_i64()?, bins.end().values_i64()?))
}

#[test]
fn test_concat_collapses_to_single_bin() -> Result<(), LatticeBinsError> {
    let var = binned(&["x"], &[2], vec![0, 2], vec![2, 5], 5)?;
    let out = concat_bins(&var, "x")?;
    assert_eq!(out.ndim(), 0);
    assert_eq!(ranges(&out)?, (vec![0], vec![5]));
    assert_eq!(out.flatten_events()?.values_f64()?, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    Ok(())
}

#[test]
fn test_concat_follows_bin_order_not_buffer_order() -> Result<(), LatticeBinsError> {
    // Bins reference the buffer back to front and skip event 2
    let var = binned(&["y", "x"], &[2, 2], vec![5, 3, 1, 0], vec![6, 5, 2, 1], 6)?;
    let out = concat_bins(&var, "x")?;
    assert_eq!(out.dims(), vec!["y"]);
    assert_eq!(ranges(&out)?, (vec![0, 3], vec![3, 5]));
    assert_eq!(out.flatten_events()?.values_f64()?, vec![5.0, 3.0, 4.0, 1.0, 0.0]);

    let bins = out.bins().ok_or_else(|| LatticeCoreError::internal("not binned"))?;
    assert_eq!(bins.buffer_len(), 5);
    let ids = bins.coords().get("id").map(|id| id.values_i64()).transpose()?;
    assert_eq!(ids, Some(vec![5, 3, 4, 1, 0]));
    Ok(())
}

#[test]
fn test_concat_outer_dim() -> Result<(), LatticeBinsError> {
    let var = binned(&["y", "x"], &[2, 2], vec![0, 1, 3, 6], vec![1, 3, 6, 7], 7)?;
    let out = concat_bins(&var, "y")?;
    assert_eq!(out.dims(), vec!["x"]);
    assert_eq!(out.bin_sizes()?.values_i64()?, vec![4, 3]);
    assert_eq!(
        out.flatten_events()?.values_f64()?,
        vec![0.0, 3.0, 4.0, 5.0, 1.0, 2.0, 6.0]
    );
    Ok(())
}

#[test]
fn test_concat_requires_binned_dim() -> Result<(), LatticeBinsError> {
    let var = binned(&["x"], &[2], vec![0, 2], vec![2, 5], 5)?;
    assert!(matches!(concat_bins(&var, "z"), Err(LatticeBinsError::InvalidParameter(_))));
    let dense = Variable::from_f64(&["x"], &[2], vec![1.0, 2.0])?;
    assert!(matches!(concat_bins(&dense, "x"), Err(LatticeBinsError::InvalidParameter(_))));
    Ok(())
}

#[test]
fn test_masked_collapse() -> Result<(), LatticeBinsError> {
    let var = binned(&["x"], &[3], vec![0, 2, 3], vec![2, 3, 5], 5)?;
    let da = DataArray::new(var)
        .with_coord("x", Variable::from_f64(&["x"], &[3], vec![0.0, 1.0, 2.0])?)?
        .with_attr("label", Variable::scalar(1.0))?
        .with_mask("m", Variable::from_bool(&["x"], &[3], vec![false, true, false])?)?;
    let out = concat_bins_data_array(&da, "x")?;
    assert_eq!(out.dims(), Vec::<&str>::new());
    assert_eq!(out.data().flatten_events()?.values_f64()?, vec![0.0, 1.0, 3.0, 4.0]);
    assert!(out.coords().is_empty());
    assert!(out.masks().is_empty());
    assert!(out.attrs().contains("label"));
    Ok(())
}

#[rstest]
#[case(vec![0.5, 2.5, 0.1, 2.9], vec![4, 0, 8])]
#[case(vec![9.0, 9.0, 0.0, 0.0], vec![5, 0, 0])]
#[case(vec![2.0, 2.0, 2.0, 2.0], vec![0, 0, 12])]
fn test_combine_groups_in_edge_order(
    #[case] param: Vec<f64>,
    #[case] expected_sizes: Vec<i64>,
) -> Result<(), LatticeBinsError> {
    // Bin sizes 3, 4, 1, 4 along x
    let var = binned(&["x"], &[4], vec![0, 3, 7, 8], vec![3, 7, 8, 12], 12)?;
    let param = Variable::from_f64(&["x"], &[4], param)?;
    let edges = Variable::from_f64(&["p"], &[4], vec![0.0, 1.0, 2.0, 3.0])?;
    let out = combine_bins_by_binning(&var, &param, &edges)?;
    assert_eq!(out.dims(), vec!["p"]);
    assert_eq!(out.bin_sizes()?.values_i64()?, expected_sizes);
    Ok(())
}

#[test]
fn test_combine_keeps_event_order_within_group() -> Result<(), LatticeBinsError> {
    let var = binned(&["y", "x"], &[2, 3], vec![0, 1, 2, 3, 4, 5], vec![1, 2, 3, 4, 5, 6], 6)?;
    let param = Variable::from_f64(&["x"], &[3], vec![1.5, 0.5, 1.2])?;
    let edges = Variable::from_f64(&["p"], &[3], vec![0.0, 1.0, 2.0])?;
    let out = combine_bins_by_binning(&var, &param, &edges)?;
    assert_eq!(out.dims(), vec!["y", "p"]);
    assert_eq!(out.bin_sizes()?.values_i64()?, vec![1, 2, 1, 2]);
    assert_eq!(
        out.flatten_events()?.values_f64()?,
        vec![1.0, 0.0, 2.0, 4.0, 3.0, 5.0]
    );
    Ok(())
}

#[test]
fn test_combine_bins_data_array() -> Result<(), LatticeBinsError> {
    let var = binned(&["x"], &[3], vec![0, 2, 3], vec![2, 3, 5], 5)?;
    let da = DataArray::new(var)
        .with_coord("p", Variable::from_f64(&["x"], &[3], vec![0.5, 0.7, 1.5])?)?
        .with_mask("m", Variable::from_bool(&["x"], &[3], vec![false, true, false])?)?;
    let edges = Variable::from_f64(&["p"], &[3], vec![0.0, 1.0, 2.0])?;
    let out = combine_bins(&da, &edges)?;
    assert_eq!(out.dims(), vec!["p"]);
    assert!(out.coords().get("p").is_some_and(|p| p.identical(&edges)));
    assert_eq!(out.data().bin_sizes()?.values_i64()?, vec![2, 2]);
    assert_eq!(out.data().flatten_events()?.values_f64()?, vec![0.0, 1.0, 3.0, 4.0]);
    Ok(())
}

/// One event per bin over `[x, y] = [3, 2]`, each event valued by its flat bin index
fn one_event_per_bin() -> Result<Variable, LatticeCoreError> {
    binned(&["x", "y"], &[3, 2], (0..6).collect(), (1..7).collect(), 6)
}

#[test]
fn test_concat_leading_dim() -> Result<(), LatticeBinsError> {
    let out = concat_bins(&one_event_per_bin()?, "x")?;
    assert_eq!(out.dims(), vec!["y"]);
    assert_eq!(out.bin_sizes()?.values_i64()?, vec![3, 3]);
    assert_eq!(
        out.flatten_events()?.values_f64()?,
        vec![0.0, 2.0, 4.0, 1.0, 3.0, 5.0]
    );
    Ok(())
}

#[test]
fn test_combine_leading_dim() -> Result<(), LatticeBinsError> {
    let param = Variable::from_f64(&["x"], &[3], vec![0.5, 1.5, 0.7])?;
    let edges = Variable::from_f64(&["p"], &[3], vec![0.0, 1.0, 2.0])?;
    let out = combine_bins_by_binning(&one_event_per_bin()?, &param, &edges)?;
    assert_eq!(out.dims(), vec!["y", "p"]);
    assert_eq!(out.bin_sizes()?.values_i64()?, vec![2, 1, 2, 1]);
    assert_eq!(
        out.flatten_events()?.values_f64()?,
        vec![0.0, 4.0, 2.0, 1.0, 5.0, 3.0]
    );
    Ok(())
}

#[test]
fn test_combine_along_same_dim() -> Result<(), LatticeBinsError> {
    // Bin sizes 2, 1, 2 along x
    let var = binned(&["x"], &[3], vec![0, 2, 3], vec![2, 3, 5], 5)?;
    let param = Variable::from_f64(&["x"], &[3], vec![1.5, 0.2, 1.1])?;
    let edges = Variable::from_f64(&["x"], &[3], vec![0.0, 1.0, 2.0])?;
    let out = combine_bins_by_binning(&var, &param, &edges)?;
    assert_eq!(out.dims(), vec!["x"]);
    assert_eq!(out.bin_sizes()?.values_i64()?, vec![1, 4]);
    assert_eq!(out.flatten_events()?.values_f64()?, vec![2.0, 0.0, 1.0, 3.0, 4.0]);

    let da = DataArray::new(var).with_coord("x", param)?;
    let out = combine_bins(&da, &edges)?;
    assert_eq!(out.dims(), vec!["x"]);
    assert!(out.coords().get("x").is_some_and(|x| x.identical(&edges)));
    assert_eq!(out.data().flatten_events()?.values_f64()?, vec![2.0, 0.0, 1.0, 3.0, 4.0]);
    Ok(())
}

#[test]
fn test_combine_by_bin_edge_coord() -> Result<(), LatticeBinsError> {
    // Midpoints of the edges are 1.5, 1.0 and 0.5
    let var = binned(&["x"], &[3], vec![0, 2, 3], vec![2, 3, 5], 5)?;
    let da = DataArray::new(var)
        .with_coord("p", Variable::from_f64(&["x"], &[4], vec![1.0, 2.0, 0.0, 1.0])?)?;
    let edges = Variable::from_f64(&["p"], &[3], vec![0.0, 1.0, 2.0])?;
    let out = combine_bins(&da, &edges)?;
    assert_eq!(out.dims(), vec!["p"]);
    assert_eq!(out.data().bin_sizes()?.values_i64()?, vec![2, 3]);
    assert_eq!(out.data().flatten_events()?.values_f64()?, vec![3.0, 4.0, 0.0, 1.0, 2.0]);
    Ok(())
}

#[test]
fn test_two_dimensional_mask_hides_events() -> Result<(), LatticeBinsError> {
    // Masks the events 1 and 4
    let da = DataArray::new(one_event_per_bin()?)
        .with_coord("p", Variable::from_f64(&["x"], &[3], vec![0.5, 1.5, 0.7])?)?
        .with_mask(
            "m",
            Variable::from_bool(&["x", "y"], &[3, 2], vec![false, true, false, false, true, false])?,
        )?;

    let concatenated = concat_bins_data_array(&da, "x")?;
    assert_eq!(concatenated.dims(), vec!["y"]);
    assert_eq!(concatenated.data().bin_sizes()?.values_i64()?, vec![2, 2]);
    assert_eq!(
        concatenated.data().flatten_events()?.values_f64()?,
        vec![0.0, 2.0, 3.0, 5.0]
    );
    assert!(concatenated.masks().is_empty());

    let edges = Variable::from_f64(&["p"], &[3], vec![0.0, 1.0, 2.0])?;
    let combined = combine_bins(&da, &edges)?;
    assert_eq!(combined.dims(), vec!["y", "p"]);
    assert_eq!(combined.data().bin_sizes()?.values_i64()?, vec![1, 1, 1, 1]);
    assert_eq!(
        combined.data().flatten_events()?.values_f64()?,
        vec![0.0, 2.0, 5.0, 3.0]
    );
    Ok(())
}

fn bin_sizes_strategy() -> impl Strategy<Value = (usize, usize, Vec<i64>)> {
    (1usize..4, 1usize..4).prop_flat_map(|(ny, nx)| {
        (Just(ny), Just(nx), prop::collection::vec(0i64..5, ny * nx))
    })
}

proptest! {
    #[test]
    fn test_concat_conserves_sizes((ny, nx, sizes) in bin_sizes_strategy()) {
        let end = sizes.iter().scan(0, |acc, s| { *acc += s; Some(*acc) }).collect::<Vec<_>>();
        let begin = end.iter().zip(sizes.iter()).map(|(e, s)| e - s).collect::<Vec<_>>();
        let total = sizes.iter().sum::<i64>() as usize;
        let var = binned(&["y", "x"], &[ny, nx], begin, end, total).unwrap();

        let out = concat_bins(&var, "x").unwrap();
        let expected = sizes.chunks(nx).map(|row| row.iter().sum::<i64>()).collect::<Vec<_>>();
        prop_assert_eq!(out.bin_sizes().unwrap().values_i64().unwrap(), expected);

        let mut before = var.flatten_events().unwrap().values_f64().unwrap();
        let mut after = out.flatten_events().unwrap().values_f64().unwrap();
        before.sort_by(f64::total_cmp);
        after.sort_by(f64::total_cmp);
        prop_assert_eq!(before, after);
    }
}
