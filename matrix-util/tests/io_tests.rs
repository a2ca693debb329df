use matrix_util::common_io::*;

#[test]
fn gz_lines_round_trip() -> anyhow::Result<()> {
    let lines: Vec<Box<str>> = vec!["view_0".into(), "view_1".into(), "a b c".into()];

    let file = create_temp_dir_file("txt.gz")?;
    let file = file.to_str().unwrap();
    mkdir(file)?;
    write_lines(&lines, file)?;

    let back = read_lines(file)?;
    assert_eq!(lines, back);

    std::fs::remove_file(file)?;
    Ok(())
}
